//! Audit trail of processed and approved casts.
//!
//! The orchestrator and the approval finalizer report through `AuditSink`.
//! Audit failures are surfaced to the caller but never undo or block a
//! file-state transition.

mod csv_log;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cast::Cast;

pub use csv_log::{AuditLog, AuditRecord};

/// Errors writing the audit trail.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Audit log CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to hash raw capture {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Processing context recorded with each step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepAuditInfo {
    /// Descriptor file name used for the cast.
    pub con_filename: String,
    pub latitude: f64,
    /// Command line of the step that produced the output.
    pub last_command: String,
}

/// Destination for audit events. Shared across workers.
pub trait AuditSink: Send + Sync {
    /// Record a processing output.
    fn log_step(&self, cast: &Cast, output: &Path, info: &StepAuditInfo) -> AuditResult<()>;

    /// Record the approved deliverable of a cast.
    fn log_approved(&self, cast: &Cast, output: &Path, comment: &str) -> AuditResult<()>;

    /// Persist pending records.
    fn flush(&self) -> AuditResult<()>;
}
