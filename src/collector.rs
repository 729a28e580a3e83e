use crate::config::Config;
use crate::driver::Driver;
use crate::mapper::{ChannelReading, NormalizedReading, Translations};
use crate::record::TelemetryRecord;
use crate::registry::{discover, Device, DeviceRegistry, DiscoveryRetry};
use crate::writer::LogWriter;
use chrono::Local;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const STATS_DUMP_INTERVAL_SECS: f32 = 3600.0; //secs between showing stats
/// Cached channel values older than this are queried from the inverter again
pub const CHANNEL_MAX_AGE: Duration = Duration::from_secs(5);
const WAIT_STEP: Duration = Duration::from_millis(50);

#[derive(Default)]
struct PollStats {
    ok: u64,
    missed: u64,
    write_errors: u64,
    /// last reported energy yield per device
    energy_yield: BTreeMap<String, String>,
}

pub struct Collector<D: Driver> {
    driver: D,
    config: Config,
    translations: Arc<Translations>,
    registry: DeviceRegistry,
    retry: DiscoveryRetry,
    writer: LogWriter,
    running: Arc<AtomicBool>,
    stats: PollStats,
}

impl<D: Driver> Collector<D> {
    pub fn new(
        driver: D,
        config: Config,
        translations: Arc<Translations>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            driver,
            config,
            translations,
            registry: DeviceRegistry::default(),
            retry: DiscoveryRetry::new(false),
            writer: LogWriter::new(),
            running,
            stats: PollStats::default(),
        }
    }

    /// Initial detection; missing devices are looked for again later
    pub fn start(&mut self) {
        let all_found = discover(&mut self.driver, self.config.device_count);
        self.retry.set_result(all_found);
        self.registry.enumerate(&mut self.driver);
        info!("{} device(s) registered", self.registry.len());
        if !self.retry.all_found() && !self.config.discovery {
            info!("missing devices will be searched for again later");
        }
    }

    pub fn run(&mut self) {
        if self.config.discovery {
            self.tick();
            return;
        }

        info!(
            "polling every {}, logging to {}",
            humantime::format_duration(self.config.delay),
            self.config.log_directory.display()
        );
        let mut stats_interval = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            self.tick();

            if stats_interval.elapsed() > Duration::from_secs_f32(STATS_DUMP_INTERVAL_SECS) {
                stats_interval = Instant::now();
                self.dump_stats();
            }

            if !self.wait(self.config.delay) {
                info!("termination requested, leaving poll loop");
                break;
            }
            self.after_delay();
        }
        self.dump_stats();
    }

    /// One pass over all registered devices
    pub fn tick(&mut self) {
        let date = Local::now().format("%Y-%m-%d").to_string();
        let started = Instant::now();
        let devices: Vec<Device> = self.registry.iter().cloned().collect();

        for device in &devices {
            let record = match self.fetch(device) {
                Some(record) => record,
                None => {
                    self.stats.missed += 1;
                    if self.config.discovery {
                        println!("Data: no data received from {}", device.name);
                    }
                    continue;
                }
            };
            self.stats.ok += 1;
            if let Some(energy) = record.value("energy_yield").filter(|v| !v.is_empty()) {
                self.stats
                    .energy_yield
                    .insert(device.name.clone(), energy.to_string());
            }

            let header = record.header();
            let line = record.line();
            debug!("{}: header: {}", device.name, header);
            debug!("{}: line: {}", device.name, line);

            if self.config.discovery {
                println!("Data: {}", line);
                println!("Header: {}", header);
                continue;
            }

            let directory = self.config.log_directory.join(&device.name);
            if let Err(e) = self
                .writer
                .write(
                    &directory,
                    &format!("{}.csv", date),
                    &record.fields(),
                    &record.header_fields(),
                    true,
                )
            {
                warn!("{}: sample not logged: {}", device.name, e);
                self.stats.write_errors += 1;
            }
        }

        let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
        debug!(
            "query of {} device(s) took {}",
            devices.len(),
            humantime::format_duration(elapsed)
        );
    }

    /// Reads every channel of `device`. Unreadable channels are skipped; no
    /// channels at all means a missed sample.
    fn fetch(&mut self, device: &Device) -> Option<TelemetryRecord> {
        let channels = match self.driver.channels(device.handle) {
            Ok(channels) => channels,
            Err(e) => {
                debug!("{}: {}", device.name, e);
                return None;
            }
        };

        let mut readings: Vec<NormalizedReading> = Vec::with_capacity(channels.len());
        for channel in channels {
            let name = match self.driver.channel_name(channel) {
                Ok(name) => name,
                Err(e) => {
                    debug!("{}: cannot read channel name: {}", device.name, e);
                    continue;
                }
            };
            let unit = self.driver.channel_unit(channel).unwrap_or_default();
            let value = match self
                .driver
                .channel_value(channel, device.handle, CHANNEL_MAX_AGE)
            {
                Ok(value) => value,
                Err(e) => {
                    debug!("{}: cannot read value of {}: {}", device.name, name, e);
                    continue;
                }
            };

            if self.config.discovery {
                let texts = self.driver.status_texts(channel);
                if !texts.is_empty() {
                    println!("Channel {} has the following text options (raw from the device):", name);
                    for text in texts {
                        println!("\t{}", text);
                    }
                }
            }

            let reading = ChannelReading { name, unit, value };
            readings.push(self.translations.normalize(&reading));
        }

        if readings.is_empty() {
            debug!("{}: no channel could be read", device.name);
            return None;
        }

        if self.config.discovery {
            for r in &readings {
                println!("Name: {} name(units): {} value: {}", r.name, r.label, r.value);
            }
        }

        Some(TelemetryRecord::build(&readings, Local::now()))
    }

    /// Sleeps for `delay` unless termination is requested meanwhile; returns
    /// false when it was.
    fn wait(&self, delay: Duration) -> bool {
        let until = Instant::now() + delay;
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            thread::sleep(WAIT_STEP.min(until - now));
        }
    }

    /// Rediscovers once enough poll delay has passed with devices missing
    fn after_delay(&mut self) {
        if self.retry.elapse(self.config.delay) {
            info!("not all devices were found initially, trying to find them now");
            let all_found = discover(&mut self.driver, self.config.device_count);
            self.retry.set_result(all_found);
            self.registry.enumerate(&mut self.driver);
        }
    }

    fn dump_stats(&self) {
        info!(
            "📊 poll statistics: ok: {}, missed: {}, write errors: {}",
            self.stats.ok, self.stats.missed, self.stats.write_errors
        );
        for (device, energy) in &self.stats.energy_yield {
            info!("{}: energy yield: {} kWh", device, energy);
        }
    }
}
