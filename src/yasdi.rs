//! Binding to the SMA YASDI master library.
//!
//! Only built with the `yasdi` feature, since linking requires
//! `libyasdimaster` to be installed on the host.

use crate::driver::{ChannelHandle, DetectionStatus, DeviceHandle, Driver, DriverError, RawValue};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int};
use std::path::Path;
use std::time::Duration;

type Dword = u32;

const YE_OK: c_int = 0;
const YE_NOT_ALL_DEVS_FOUND: c_int = -1;
const YE_DEV_DETECT_IN_PROGRESS: c_int = -7;

const SPOTCHANNELS: c_int = 0;

const MAX_DRIVERS: usize = 10;
const DEVICE_MAX: usize = 50;
const MAX_CHANNEL_COUNT: usize = 500;
const SIZE_NAME: usize = 64;

#[allow(non_snake_case)]
#[link(name = "yasdimaster")]
extern "C" {
    fn yasdiMasterInitialize(ini_file: *const c_char, driver_count: *mut Dword) -> c_int;
    fn yasdiMasterShutdown();
    fn yasdiMasterGetDriver(handles: *mut Dword, max_handles: c_int) -> Dword;
    fn yasdiGetDriverName(driver: Dword, buffer: *mut c_char, max_size: Dword) -> c_int;
    fn yasdiSetDriverOnline(driver: Dword) -> c_int;
    fn yasdiSetDriverOffline(driver: Dword);
    fn DoStartDeviceDetection(device_count: c_int, wait_for_done: c_int) -> c_int;
    fn GetDeviceHandles(handles: *mut Dword, max_handles: Dword) -> Dword;
    fn GetDeviceName(device: Dword, buffer: *mut c_char, len: c_int) -> c_int;
    fn GetChannelHandlesEx(
        device: Dword,
        handles: *mut Dword,
        max_handles: Dword,
        channel_type: c_int,
    ) -> Dword;
    fn GetChannelName(channel: Dword, buffer: *mut c_char, max_size: Dword) -> c_int;
    fn GetChannelUnit(channel: Dword, buffer: *mut c_char, max_size: Dword) -> c_int;
    fn GetChannelValue(
        channel: Dword,
        device: Dword,
        value: *mut c_double,
        text: *mut c_char,
        max_text: Dword,
        max_age: Dword,
    ) -> c_int;
    fn GetChannelStatTextCnt(channel: Dword) -> c_int;
    fn GetChannelStatText(channel: Dword, index: c_int, buffer: *mut c_char, len: c_int) -> c_int;
}

fn buffer_to_string(buf: &[u8]) -> String {
    CStr::from_bytes_until_nul(buf)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct Yasdi {
    drivers: Vec<Dword>,
}

impl Yasdi {
    /// Initializes the master library from `config_file` and switches every
    /// driver it offers online. Fails when no driver comes online.
    pub fn open(config_file: &Path) -> Result<Self, DriverError> {
        let path = config_file.to_string_lossy().into_owned();
        let c_path = CString::new(path.clone()).map_err(|_| DriverError::Init(path.clone()))?;
        let mut count: Dword = 0;
        if unsafe { yasdiMasterInitialize(c_path.as_ptr(), &mut count) } != 0 {
            return Err(DriverError::Init(path));
        }

        let mut handles = [0 as Dword; MAX_DRIVERS];
        let found =
            unsafe { yasdiMasterGetDriver(handles.as_mut_ptr(), MAX_DRIVERS as c_int) } as usize;
        let yasdi = Self {
            drivers: handles[..found.min(MAX_DRIVERS)].to_vec(),
        };

        let mut any_online = false;
        for &driver in &yasdi.drivers {
            let name = Yasdi::driver_name(driver);
            debug!("switching on driver: {}", name);
            if unsafe { yasdiSetDriverOnline(driver) } != 0 {
                any_online = true;
            } else {
                warn!("driver {} failed to go online", name);
            }
        }

        if !any_online {
            // dropping shuts the master library down again
            return Err(DriverError::NoDriverOnline);
        }
        Ok(yasdi)
    }

    fn driver_name(driver: Dword) -> String {
        let mut buf = [0u8; SIZE_NAME];
        unsafe {
            yasdiGetDriverName(driver, buf.as_mut_ptr() as *mut c_char, (SIZE_NAME - 1) as Dword);
        }
        buffer_to_string(&buf)
    }
}

impl Drop for Yasdi {
    fn drop(&mut self) {
        for &driver in &self.drivers {
            debug!("switching off driver: {}", Yasdi::driver_name(driver));
            unsafe { yasdiSetDriverOffline(driver) };
        }
        unsafe { yasdiMasterShutdown() };
    }
}

impl Driver for Yasdi {
    fn detect_devices(&mut self, count: u32) -> DetectionStatus {
        match unsafe { DoStartDeviceDetection(count as c_int, 1) } {
            YE_OK => DetectionStatus::AllFound,
            YE_DEV_DETECT_IN_PROGRESS => DetectionStatus::InProgress,
            YE_NOT_ALL_DEVS_FOUND => DetectionStatus::NotAllFound,
            code => DetectionStatus::Unknown(code),
        }
    }

    fn devices(&mut self) -> Vec<(DeviceHandle, String)> {
        let mut handles = [0 as Dword; DEVICE_MAX];
        let count = unsafe { GetDeviceHandles(handles.as_mut_ptr(), DEVICE_MAX as Dword) } as usize;
        handles[..count.min(DEVICE_MAX)]
            .iter()
            .map(|&handle| {
                let mut buf = [0u8; SIZE_NAME];
                unsafe {
                    GetDeviceName(
                        handle,
                        buf.as_mut_ptr() as *mut c_char,
                        (SIZE_NAME - 1) as c_int,
                    );
                }
                (DeviceHandle(handle), buffer_to_string(&buf))
            })
            .collect()
    }

    fn channels(&mut self, device: DeviceHandle) -> Result<Vec<ChannelHandle>, DriverError> {
        let mut handles = vec![0 as Dword; MAX_CHANNEL_COUNT];
        let count = unsafe {
            GetChannelHandlesEx(
                device.0,
                handles.as_mut_ptr(),
                MAX_CHANNEL_COUNT as Dword,
                SPOTCHANNELS,
            )
        } as usize;
        if count == 0 {
            return Err(DriverError::NoChannels(device));
        }
        handles.truncate(count.min(MAX_CHANNEL_COUNT));
        Ok(handles.into_iter().map(ChannelHandle).collect())
    }

    fn channel_name(&mut self, channel: ChannelHandle) -> Result<String, DriverError> {
        let mut buf = [0u8; SIZE_NAME];
        let code = unsafe {
            GetChannelName(channel.0, buf.as_mut_ptr() as *mut c_char, (SIZE_NAME - 1) as Dword)
        };
        if code != YE_OK {
            return Err(DriverError::Channel {
                channel: channel.0,
                code,
            });
        }
        Ok(buffer_to_string(&buf))
    }

    fn channel_unit(&mut self, channel: ChannelHandle) -> Result<String, DriverError> {
        let mut buf = [0u8; SIZE_NAME];
        let code = unsafe {
            GetChannelUnit(channel.0, buf.as_mut_ptr() as *mut c_char, (SIZE_NAME - 1) as Dword)
        };
        if code != YE_OK {
            return Err(DriverError::Channel {
                channel: channel.0,
                code,
            });
        }
        Ok(buffer_to_string(&buf))
    }

    fn channel_value(
        &mut self,
        channel: ChannelHandle,
        device: DeviceHandle,
        max_age: Duration,
    ) -> Result<RawValue, DriverError> {
        let mut number: c_double = 0.0;
        let mut buf = [0u8; SIZE_NAME];
        let code = unsafe {
            GetChannelValue(
                channel.0,
                device.0,
                &mut number,
                buf.as_mut_ptr() as *mut c_char,
                (SIZE_NAME - 1) as Dword,
                max_age.as_secs() as Dword,
            )
        };
        if code != YE_OK {
            return Err(DriverError::Channel {
                channel: channel.0,
                code,
            });
        }
        let text = buffer_to_string(&buf);
        if text.is_empty() {
            Ok(RawValue::Number(number))
        } else {
            Ok(RawValue::Text(text))
        }
    }

    fn status_texts(&mut self, channel: ChannelHandle) -> Vec<String> {
        let count = unsafe { GetChannelStatTextCnt(channel.0) };
        (0..count.max(0))
            .map(|index| {
                let mut buf = [0u8; SIZE_NAME];
                unsafe {
                    GetChannelStatText(
                        channel.0,
                        index,
                        buf.as_mut_ptr() as *mut c_char,
                        (SIZE_NAME - 1) as c_int,
                    );
                }
                buffer_to_string(&buf)
            })
            .collect()
    }
}
