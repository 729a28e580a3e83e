use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PID_FILE: &str = "/run/sma-logger.pid";

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("already running (pid marker: {0:?})")]
    AlreadyRunning(String),
    #[error("cannot access pid file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn is_alive(pid: libc::pid_t) -> bool {
    // signal 0 performs the permission and existence checks only
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Holds the PID marker for the lifetime of the process; dropping it removes
/// the marker.
#[derive(Debug)]
pub struct InstanceGuard {
    path: PathBuf,
}

impl InstanceGuard {
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self, GuardError> {
        let path = path.as_ref().to_path_buf();
        let io_error = |source| GuardError::Io {
            path: path.clone(),
            source,
        };

        match fs::read_to_string(&path) {
            Ok(content) => {
                let marker = content.trim();
                match marker.parse::<libc::pid_t>() {
                    Ok(pid) if pid > 0 => {
                        if is_alive(pid) {
                            return Err(GuardError::AlreadyRunning(marker.to_string()));
                        }
                        info!("removing stale pid marker of dead process {}", pid);
                    }
                    // cannot tell who owns it, so don't touch it
                    _ => return Err(GuardError::AlreadyRunning(marker.to_string())),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(e)),
        }

        fs::write(&path, format!("{}\n", std::process::id())).map_err(io_error)?;
        debug!("pid marker written: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("pid marker removed: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("cannot remove pid marker {}: {}", self.path.display(), e),
        }
    }
}
