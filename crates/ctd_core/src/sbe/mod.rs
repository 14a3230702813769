//! Transformation engine interface and the SBE Data Processing backend.
//!
//! The step runner only sees `TransformService`: text in, text out, plus the
//! last command line for the audit trail. A `TransformFactory` binds a
//! service to one cast's working directory and descriptor.

mod runner;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::{ProcessingSequence, StepFunction};

pub use runner::{program_name, SbeDataProcessing, SbeFactory};

/// Errors from the transformation engine.
#[derive(Error, Debug)]
pub enum TransformError {
    /// The bound sequence has no profile for this step.
    #[error("No profile configured for step {0}")]
    UnsupportedStep(StepFunction),

    /// The tool binary does not exist.
    #[error("Processing tool not found: {0}")]
    ToolNotFound(PathBuf),

    /// The tool could not be started.
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The tool exited unsuccessfully.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// The tool exited cleanly but wrote nothing.
    #[error("{tool} produced no output at {path}")]
    MissingOutput { tool: String, path: PathBuf },

    /// Scratch file handling failed.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl TransformError {
    /// Create a command failed error.
    pub fn command_failed(
        tool: impl Into<String>,
        exit_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Result type for transform operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// A transformation engine bound to one cast.
pub trait TransformService {
    /// Apply `function` to the input text and return the output text.
    fn invoke(&mut self, function: StepFunction, input: &str) -> TransformResult<String>;

    /// Command line of the most recent invocation, empty before the first.
    fn last_command(&self) -> &str;
}

/// What a transform service is bound to for one cast.
#[derive(Debug, Clone)]
pub struct TransformBinding {
    /// The cast's processing directory; profiles are read from here.
    pub work_dir: PathBuf,
    /// The single descriptor in the processing directory.
    pub xmlcon: PathBuf,
    pub sequence: ProcessingSequence,
}

/// Creates per-cast transform services. Shared across workers.
pub trait TransformFactory: Send + Sync {
    fn bind(&self, binding: &TransformBinding) -> TransformResult<Box<dyn TransformService>>;
}
