//! CSV audit log.
//!
//! Rows are kept in memory behind a mutex and written out atomically on
//! `flush`. With `update_rows` each cast keeps a single row that later
//! events replace; otherwise every event appends a row.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{AuditError, AuditResult, AuditSink, StepAuditInfo};
use crate::cast::Cast;
use crate::fsutil::atomic_write;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One audit log row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub base_name: String,
    pub output_file: String,
    pub serial_number: String,
    pub cast_date: String,
    pub latitude: Option<f64>,
    pub con_filename: String,
    pub last_command: String,
    pub raw_sha256: String,
    pub approve_comment: String,
    pub approve_date: String,
}

/// CSV-backed audit sink.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    update_rows: bool,
    rows: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    /// Open an audit log, loading existing rows if the file exists.
    pub fn open(path: impl Into<PathBuf>, update_rows: bool) -> AuditResult<Self> {
        let path = path.into();
        let rows = if path.is_file() { load_rows(&path)? } else { Vec::new() };
        tracing::debug!("Audit log {} has {} rows", path.display(), rows.len());

        Ok(Self {
            path,
            update_rows,
            rows: Mutex::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the rows currently held.
    pub fn rows(&self) -> Vec<AuditRecord> {
        self.rows.lock().clone()
    }

    fn record(&self, record: AuditRecord) {
        let mut rows = self.rows.lock();
        if self.update_rows {
            if let Some(existing) = rows.iter_mut().find(|r| r.base_name == record.base_name) {
                *existing = record;
                return;
            }
        }
        rows.push(record);
    }

    fn last_row_for(&self, base_name: &str) -> Option<AuditRecord> {
        self.rows
            .lock()
            .iter()
            .rev()
            .find(|r| r.base_name == base_name)
            .cloned()
    }
}

impl AuditSink for AuditLog {
    fn log_step(&self, cast: &Cast, output: &Path, info: &StepAuditInfo) -> AuditResult<()> {
        let raw_sha256 = hash_file(cast.raw_path())?;

        self.record(AuditRecord {
            timestamp: now(),
            base_name: cast.base_name().to_string(),
            output_file: file_name(output),
            serial_number: cast.serial_number().unwrap_or_default().to_string(),
            cast_date: cast
                .cast_date()
                .map(|d| d.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
            latitude: Some(info.latitude),
            con_filename: info.con_filename.clone(),
            last_command: info.last_command.clone(),
            raw_sha256,
            approve_comment: String::new(),
            approve_date: String::new(),
        });
        Ok(())
    }

    fn log_approved(&self, cast: &Cast, output: &Path, comment: &str) -> AuditResult<()> {
        let raw_name = cast.raw_path().file_name().unwrap_or_default();
        let approved_raw = cast.approved_dir().join("raw").join(raw_name);
        let raw = if approved_raw.is_file() {
            approved_raw
        } else {
            cast.raw_path().to_path_buf()
        };

        let mut record = self.last_row_for(cast.base_name()).unwrap_or_else(|| AuditRecord {
            base_name: cast.base_name().to_string(),
            serial_number: cast.serial_number().unwrap_or_default().to_string(),
            cast_date: cast
                .cast_date()
                .map(|d| d.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
            latitude: cast.latitude(),
            ..AuditRecord::default()
        });

        let timestamp = now();
        record.timestamp = timestamp.clone();
        record.output_file = file_name(output);
        record.raw_sha256 = hash_file(&raw)?;
        record.approve_comment = comment.to_string();
        record.approve_date = timestamp;

        self.record(record);
        Ok(())
    }

    fn flush(&self) -> AuditResult<()> {
        let rows = self.rows.lock();
        let csv_err = |source| AuditError::Csv {
            path: self.path.clone(),
            source,
        };

        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in rows.iter() {
            writer.serialize(row).map_err(csv_err)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AuditError::Io {
                path: self.path.clone(),
                source: e.into_error(),
            })?;

        atomic_write(&self.path, &bytes).map_err(|source| AuditError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!("Wrote {} audit rows to {}", rows.len(), self.path.display());
        Ok(())
    }
}

fn load_rows(path: &Path) -> AuditResult<Vec<AuditRecord>> {
    let file = File::open(path).map_err(|source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().from_reader(file);

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: AuditRecord = result.map_err(|source| AuditError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Hex SHA-256 of a file's contents.
fn hash_file(path: &Path) -> AuditResult<String> {
    let hash_err = |source| AuditError::Hash {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(hash_err)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(hash_err)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
