//! Append-only CSV log of deletion attempts.
//!
//! Columns, no header row: timestamp, path, kind, size, outcome, error.
//! Each record is flushed and synced before the next item is touched.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::AuditError;
use crate::model::AuditRecord;

/// `<dir>/cleanup_log_<YYYYmmdd_HHMMSS>.csv`
pub fn default_log_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "cleanup_log_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// An open audit destination, held for one deletion run.
pub struct AuditLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl AuditLog {
    /// Open `path` for appending, creating it and its directory if needed.
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        let open_err = |source| AuditError::Open {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(open_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_err)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        tracing::debug!(path = %path.display(), "audit log opened");
        Ok(AuditLog {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record durably.
    pub fn append(&mut self, record: &AuditRecord) -> Result<(), AuditError> {
        self.writer
            .write_record(record.to_row())
            .map_err(|source| AuditError::Write {
                path: self.path.clone(),
                source,
            })?;
        let flush_err = |source| AuditError::Flush {
            path: self.path.clone(),
            source,
        };
        self.writer.flush().map_err(flush_err)?;
        self.writer.get_ref().sync_data().map_err(flush_err)
    }
}
