use clap::{ArgAction, Parser};
use ini::Ini;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LOG_DIRECTORY: &str = "/opt/sma-logger/logs";
pub const DEFAULT_DELAY_SECS: u64 = 60;
pub const MIN_DELAY_SECS: u64 = 5;
pub const MAX_DEVICES: u32 = 39;

#[derive(Parser, Debug)]
#[command(
    name = "sma-logger",
    version,
    about = "Collects SMA inverter readings into daily CSV logs",
    disable_version_flag = true
)]
pub struct Args {
    /// Full path of the YASDI config file
    #[arg(short = 'c', long = "config-file")]
    pub config_file: PathBuf,

    /// Number of devices to find
    #[arg(short = 'n', long = "number")]
    pub number: i64,

    /// Directory the CSV logs are written to
    #[arg(short = 'l', long = "log-directory", default_value = DEFAULT_LOG_DIRECTORY)]
    pub log_directory: PathBuf,

    /// Seconds between readings, ignored during discovery
    #[arg(short = 's', long = "delay", default_value_t = DEFAULT_DELAY_SECS as i64)]
    pub delay: i64,

    /// Debug output
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Print every device, channel and value once, then exit
    #[arg(short = 'i', long = "discovery")]
    pub discovery: bool,

    /// Also write the daemon's own log to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    #[allow(dead_code)]
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("number of devices must be greater than 0 and less than 40 (got {0})")]
    DeviceCount(i64),
    #[error("delay must be at least 5 seconds (got {0})")]
    Delay(i64),
    #[error("config file does not exist: {0:?}")]
    MissingConfigFile(PathBuf),
    #[error("could not create the logging directory {path:?}: {source}")]
    LogDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse driver config {path:?}: {source}")]
    DriverConfig { path: PathBuf, source: ini::Error },
}

/// Validated runtime configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub log_directory: PathBuf,
    pub config_file: PathBuf,
    pub device_count: u32,
    pub delay: Duration,
    pub discovery: bool,
}

impl Config {
    /// Validates the arguments and creates the log directory
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        if args.number < 1 || args.number > MAX_DEVICES as i64 {
            return Err(ConfigError::DeviceCount(args.number));
        }
        if args.delay < MIN_DELAY_SECS as i64 {
            return Err(ConfigError::Delay(args.delay));
        }
        if !args.config_file.is_file() {
            return Err(ConfigError::MissingConfigFile(args.config_file.clone()));
        }
        fs::create_dir_all(&args.log_directory).map_err(|source| ConfigError::LogDirectory {
            path: args.log_directory.clone(),
            source,
        })?;

        Ok(Self {
            log_directory: args.log_directory.clone(),
            config_file: args.config_file.clone(),
            device_count: args.number as u32,
            delay: Duration::from_secs(args.delay as u64),
            discovery: args.discovery,
        })
    }
}

/// Driver modules listed in the `[DriverModules]` section of a YASDI config
pub fn driver_modules(path: &Path) -> Result<Vec<String>, ConfigError> {
    let conf = Ini::load_from_file(path).map_err(|source| ConfigError::DriverConfig {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(conf
        .section(Some("DriverModules"))
        .map(|section| section.iter().map(|(_, module)| module.to_string()).collect())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const YASDI_INI: &str = "[DriverModules]\n\
        Driver0=yasdi_drv_serial\n\
        Driver1=yasdi_drv_ip\n\
        \n\
        [COM1]\n\
        Device=/dev/ttyUSB0\n\
        Media=RS485\n\
        Baudrate=1200\n\
        Protocol=SMANet\n";

    fn setup() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let conf = tmp.path().join("yasdi.ini");
        fs::write(&conf, YASDI_INI).unwrap();
        (tmp, conf)
    }

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("sma-logger").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let (tmp, conf) = setup();
        let logs = tmp.path().join("logs");
        let args = parse(&[
            "-c",
            conf.to_str().unwrap(),
            "-n",
            "2",
            "-l",
            logs.to_str().unwrap(),
        ]);
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.device_count, 2);
        assert_eq!(config.delay, Duration::from_secs(DEFAULT_DELAY_SECS));
        assert!(!config.discovery);
        assert!(logs.is_dir());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let (tmp, conf) = setup();
        let logs = tmp.path().join("logs");
        let conf = conf.to_str().unwrap();
        let logs = logs.to_str().unwrap();

        for n in ["0", "40"] {
            let args = parse(&["-c", conf, "-l", logs, "-n", n]);
            assert!(matches!(
                Config::from_args(&args),
                Err(ConfigError::DeviceCount(_))
            ));
        }
        let args = parse(&["-c", conf, "-l", logs, "-n", "39", "-s", "4"]);
        assert!(matches!(Config::from_args(&args), Err(ConfigError::Delay(4))));

        let args = parse(&["-c", conf, "-l", logs, "-n", "1", "-s", "5", "-d", "-i"]);
        let config = Config::from_args(&args).unwrap();
        assert!(args.debug && config.discovery);
    }

    #[test]
    fn missing_config_file() {
        let tmp = TempDir::new().unwrap();
        let conf = tmp.path().join("nope.ini");
        let args = parse(&["-c", conf.to_str().unwrap(), "-n", "1"]);
        assert!(matches!(
            Config::from_args(&args),
            Err(ConfigError::MissingConfigFile(_))
        ));
    }

    #[test]
    fn reads_driver_modules() {
        let (_tmp, conf) = setup();
        assert_eq!(
            driver_modules(&conf).unwrap(),
            vec!["yasdi_drv_serial", "yasdi_drv_ip"]
        );
    }
}
