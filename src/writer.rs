use csv::WriterBuilder;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LATEST_FILE: &str = "latest.csv";
pub const LATEST_FILE_OLD: &str = "latest.csv.OLD";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot create log directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("cannot open log file {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot write log file {path:?}: {source}")]
    Write { path: PathBuf, source: csv::Error },
}

/// One CSV row without its terminator, fields quoted where needed
pub fn encode_row(fields: &[&str]) -> String {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(vec![]);
    if let Err(e) = wtr.write_record(fields) {
        warn!("cannot encode row: {}", e);
        return String::new();
    }
    match wtr.into_inner() {
        Ok(data) => String::from_utf8_lossy(&data).trim_end_matches('\n').to_string(),
        Err(e) => {
            warn!("cannot encode row: {}", e.error());
            String::new()
        }
    }
}

/// Appends CSV rows to a dated file and, optionally, to `latest.csv` in the
/// same directory.
///
/// A missing directory or a missing dated file starts a new period: the
/// previous `latest.csv` is moved to `latest.csv.OLD` and both files get a
/// header before their first line.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write(
        &self,
        directory: &Path,
        filename: &str,
        row: &[&str],
        header: &[&str],
        also_latest: bool,
    ) -> Result<(), WriteError> {
        let mut rotate = false;

        if !directory.is_dir() {
            debug!("log directory doesn't exist, creating it: {}", directory.display());
            fs::create_dir_all(directory).map_err(|source| WriteError::CreateDir {
                path: directory.to_path_buf(),
                source,
            })?;
            rotate = true;
        }

        let path = directory.join(filename);
        let write_header = !path.exists();
        if write_header {
            debug!("new log file: {}", path.display());
            rotate = true;
        }
        let dated = append(&path, write_header.then_some(header), row);
        if let Err(e) = &dated {
            error!("{}", e);
        }

        if also_latest {
            let latest = directory.join(LATEST_FILE);
            if rotate {
                let old = directory.join(LATEST_FILE_OLD);
                match fs::rename(&latest, &old) {
                    Ok(()) => debug!("rotated {} to {}", latest.display(), old.display()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => warn!("cannot rotate {}: {}", latest.display(), e),
                }
            }
            let write_header = rotate || !latest.exists();
            let result = append(&latest, write_header.then_some(header), row);
            if let Err(e) = &result {
                error!("{}", e);
            }
            // the dated file's failure is the one to report when both fail
            dated?;
            return result;
        }

        dated
    }
}

/// Header and row are buffered and go out in a single flush, so a failed
/// open leaves the file untouched.
fn append(path: &Path, header: Option<&[&str]>, row: &[&str]) -> Result<(), WriteError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| WriteError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let write_error = |source| WriteError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
    if let Some(header) = header {
        wtr.write_record(header).map_err(write_error)?;
    }
    wtr.write_record(row).map_err(write_error)?;
    wtr.flush().map_err(|e| write_error(e.into()))
}
