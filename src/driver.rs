use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u32);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a blocking device detection request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionStatus {
    AllFound,
    InProgress,
    NotAllFound,
    Unknown(i32),
}

/// A channel value as delivered by the driver: either a status text
/// (enumerated keyword channels) or a plain number.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Text(String),
    Number(f64),
}

#[derive(Debug, Error)]
#[cfg_attr(not(feature = "yasdi"), allow(dead_code))]
pub enum DriverError {
    #[error("no driver could be switched online")]
    NoDriverOnline,
    #[error("driver support not available: {0}")]
    Unavailable(&'static str),
    #[error("cannot initialize driver library with config {0:?}")]
    Init(String),
    #[error("no channels available for device {0}")]
    NoChannels(DeviceHandle),
    #[error("channel {channel} read failed with code {code}")]
    Channel { channel: u32, code: i32 },
}

/// Device access as offered by the vendor driver. All calls are blocking and
/// rely on the driver's own timeouts.
pub trait Driver {
    fn detect_devices(&mut self, count: u32) -> DetectionStatus;
    fn devices(&mut self) -> Vec<(DeviceHandle, String)>;
    fn channels(&mut self, device: DeviceHandle) -> Result<Vec<ChannelHandle>, DriverError>;
    fn channel_name(&mut self, channel: ChannelHandle) -> Result<String, DriverError>;
    fn channel_unit(&mut self, channel: ChannelHandle) -> Result<String, DriverError>;
    /// Reads a channel value; the driver queries the device again when its
    /// cached value is older than `max_age`.
    fn channel_value(
        &mut self,
        channel: ChannelHandle,
        device: DeviceHandle,
        max_age: Duration,
    ) -> Result<RawValue, DriverError>;
    fn status_texts(&mut self, channel: ChannelHandle) -> Vec<String>;
}

impl<T: Driver + ?Sized> Driver for Box<T> {
    fn detect_devices(&mut self, count: u32) -> DetectionStatus {
        (**self).detect_devices(count)
    }

    fn devices(&mut self) -> Vec<(DeviceHandle, String)> {
        (**self).devices()
    }

    fn channels(&mut self, device: DeviceHandle) -> Result<Vec<ChannelHandle>, DriverError> {
        (**self).channels(device)
    }

    fn channel_name(&mut self, channel: ChannelHandle) -> Result<String, DriverError> {
        (**self).channel_name(channel)
    }

    fn channel_unit(&mut self, channel: ChannelHandle) -> Result<String, DriverError> {
        (**self).channel_unit(channel)
    }

    fn channel_value(
        &mut self,
        channel: ChannelHandle,
        device: DeviceHandle,
        max_age: Duration,
    ) -> Result<RawValue, DriverError> {
        (**self).channel_value(channel, device, max_age)
    }

    fn status_texts(&mut self, channel: ChannelHandle) -> Vec<String> {
        (**self).status_texts(channel)
    }
}
