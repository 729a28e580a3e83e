#[macro_use]
extern crate log;
extern crate ctrlc;
extern crate simplelog;
use simplelog::*;

use crate::collector::Collector;
use crate::config::{Args, Config};
use crate::driver::{Driver, DriverError};
use crate::mapper::Translations;
use crate::pidfile::{InstanceGuard, PID_FILE};
use clap::error::ErrorKind;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod collector;
mod config;
mod driver;
mod mapper;
mod pidfile;
mod record;
mod registry;
mod writer;
#[cfg(feature = "yasdi")]
mod yasdi;

const EXIT_NOT_ROOT: i32 = 1;
const EXIT_ALREADY_RUNNING: i32 = 2;
const EXIT_BAD_ARGUMENTS: i32 = 3;
const EXIT_NO_DRIVER: i32 = 4;

fn logging_init(debug: bool, log_file: Option<&Path>) {
    let conf = ConfigBuilder::new().set_time_format_rfc3339().build();
    let console_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![];
    loggers.push(TermLogger::new(
        console_level,
        conf.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    let mut logfile_error: Option<String> = None;
    if let Some(log_path) = log_file {
        match OpenOptions::new().create(true).append(true).open(log_path) {
            Ok(logfile) => {
                loggers.push(WriteLogger::new(LevelFilter::Info, conf, logfile));
            }
            Err(e) => {
                logfile_error = Some(format!(
                    "Error creating/opening log file: {:?}: {:?}",
                    log_path, e
                ));
            }
        }
    }

    CombinedLogger::init(loggers).expect("Cannot initialize logging subsystem");
    if let Some(e) = logfile_error {
        error!("{}", e);
        warn!("Will do console logging only...");
    }
}

#[cfg(feature = "yasdi")]
fn open_driver(config: &Config) -> Result<Box<dyn Driver>, DriverError> {
    Ok(Box::new(yasdi::Yasdi::open(&config.config_file)?))
}

#[cfg(not(feature = "yasdi"))]
fn open_driver(_config: &Config) -> Result<Box<dyn Driver>, DriverError> {
    Err(DriverError::Unavailable("built without the `yasdi` feature"))
}

/// Exit code for failures detected before the pid marker is taken. Help and
/// version output works without root; the root check comes before argument
/// errors.
fn early_exit(parsed: &Result<Args, clap::Error>, root: bool) -> Option<i32> {
    match parsed {
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            Some(0)
        }
        _ if !root => Some(EXIT_NOT_ROOT),
        Err(_) => Some(EXIT_BAD_ARGUMENTS),
        Ok(_) => None,
    }
}

fn run() -> i32 {
    let parsed = Args::try_parse();
    match &parsed {
        Ok(args) => logging_init(args.debug, args.log_file.as_deref()),
        Err(_) => logging_init(false, None),
    }

    if let Some(code) = early_exit(&parsed, pidfile::is_root()) {
        if code == EXIT_NOT_ROOT {
            error!("This program must be run as root");
        } else if let Err(e) = &parsed {
            let _ = e.print();
        }
        return code;
    }
    let args = match parsed {
        Ok(args) => args,
        Err(_) => return EXIT_BAD_ARGUMENTS,
    };
    info!("Welcome to sma-logger {}", env!("CARGO_PKG_VERSION"));

    // removes the marker on every return below
    let guard = match InstanceGuard::acquire(PID_FILE) {
        Ok(guard) => guard,
        Err(e) => {
            error!("{}", e);
            return EXIT_ALREADY_RUNNING;
        }
    };
    debug!("holding pid marker {}", guard.path().display());

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Incorrect arguments: {}", e);
            return EXIT_BAD_ARGUMENTS;
        }
    };

    match config::driver_modules(&config.config_file) {
        Ok(modules) if modules.is_empty() => {
            warn!("no [DriverModules] listed in {}", config.config_file.display())
        }
        Ok(modules) => info!("configured driver modules: {}", modules.join(", ")),
        Err(e) => warn!("{}", e),
    }

    //Ctrl-C / SIGTERM support
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    let driver = match open_driver(&config) {
        Ok(driver) => driver,
        Err(e) => {
            error!("No drivers found, exiting: {}", e);
            return EXIT_NO_DRIVER;
        }
    };

    let translations = Arc::new(Translations::new());
    let mut collector = Collector::new(driver, config, translations, running);
    collector.start();
    collector.run();

    // switches the drivers offline before the pid marker goes away
    drop(collector);
    drop(guard);
    info!("Done, exiting");
    0
}

fn main() {
    std::process::exit(run());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("sma-logger").chain(args.iter().copied()))
    }

    #[test]
    fn root_is_checked_before_argument_errors() {
        assert_eq!(early_exit(&parse(&["--bogus"]), false), Some(EXIT_NOT_ROOT));
        assert_eq!(early_exit(&parse(&["--bogus"]), true), Some(EXIT_BAD_ARGUMENTS));
        assert_eq!(early_exit(&parse(&[]), true), Some(EXIT_BAD_ARGUMENTS));
    }

    #[test]
    fn help_and_version_need_no_root() {
        assert_eq!(early_exit(&parse(&["--help"]), false), Some(0));
        assert_eq!(early_exit(&parse(&["-v"]), false), Some(0));
    }

    #[test]
    fn valid_arguments_need_root() {
        let args = ["-c", "/etc/yasdi.ini", "-n", "2"];
        assert_eq!(early_exit(&parse(&args), false), Some(EXIT_NOT_ROOT));
        assert_eq!(early_exit(&parse(&args), true), None);
    }
}
