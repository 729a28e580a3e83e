use crate::driver::{DetectionStatus, DeviceHandle, Driver};
use std::collections::BTreeMap;
use std::time::Duration;

/// Rediscovery is attempted once the summed poll delay exceeds this
pub const DISCOVERY_RETRY_THRESHOLD: Duration = Duration::from_secs(20 * 60);

#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    pub handle: DeviceHandle,
    /// filesystem-safe name, also the device's log directory
    pub name: String,
}

pub fn sanitize_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Blocking detection of up to `expected` devices. Anything but a complete
/// result counts as "not all found".
pub fn discover<D: Driver>(driver: &mut D, expected: u32) -> bool {
    debug!("trying to detect {} device(s)", expected);
    match driver.detect_devices(expected) {
        DetectionStatus::AllFound => {
            info!("all {} device(s) detected", expected);
            true
        }
        DetectionStatus::InProgress => {
            error!("device detection already in progress");
            false
        }
        DetectionStatus::NotAllFound => {
            error!("not all devices were found (expected: {})", expected);
            false
        }
        DetectionStatus::Unknown(code) => {
            error!("device detection failed with unknown driver error: {}", code);
            false
        }
    }
}

#[derive(Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceHandle, Device>,
}

impl DeviceRegistry {
    /// Drops every known device and rebuilds the registry from the driver's
    /// current handle set.
    pub fn enumerate<D: Driver>(&mut self, driver: &mut D) {
        self.devices.clear();
        for (handle, raw_name) in driver.devices() {
            let name = sanitize_name(&raw_name);
            info!("found device with handle {} and name {:?}", handle, raw_name);
            self.devices.insert(handle, Device { handle, name });
        }
        if self.devices.is_empty() {
            warn!("no devices have been found");
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }
}

/// Accumulates poll delay while discovery is incomplete
pub struct DiscoveryRetry {
    threshold: Duration,
    pending: Duration,
    all_found: bool,
}

impl DiscoveryRetry {
    pub fn new(all_found: bool) -> Self {
        Self {
            threshold: DISCOVERY_RETRY_THRESHOLD,
            pending: Duration::ZERO,
            all_found,
        }
    }

    pub fn all_found(&self) -> bool {
        self.all_found
    }

    /// Accounts for one poll delay; true when rediscovery is due. The
    /// accumulated time restarts once it triggers.
    pub fn elapse(&mut self, delay: Duration) -> bool {
        if self.all_found {
            return false;
        }
        self.pending += delay;
        if self.pending > self.threshold {
            self.pending = Duration::ZERO;
            return true;
        }
        false
    }

    pub fn set_result(&mut self, all_found: bool) {
        self.all_found = all_found;
    }
}
