//! Step-level errors.
//!
//! Every variant names the failing step and its 1-based position in the
//! full sequence so the cast-level error can report it.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::StepFunction;
use crate::sbe::TransformError;

/// Error from one step of the chain.
#[derive(Error, Debug)]
pub enum StepError {
    /// The step's input could not be read.
    #[error("Failed to read input of {step} ({}): {source}", .path.display())]
    Read {
        step: StepFunction,
        index: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The step's output could not be written.
    ///
    /// `partial` is set when a destination file was left behind.
    #[error("Failed to write output of {step} ({}): {source}", .path.display())]
    Write {
        step: StepFunction,
        index: usize,
        path: PathBuf,
        partial: bool,
        #[source]
        source: io::Error,
    },

    /// The transformation engine failed.
    #[error("{step} failed: {source}")]
    Transform {
        step: StepFunction,
        index: usize,
        #[source]
        source: TransformError,
    },
}

impl StepError {
    /// Create a transform error.
    pub fn transform(step: StepFunction, index: usize, source: TransformError) -> Self {
        Self::Transform {
            step,
            index,
            source,
        }
    }

    pub fn step(&self) -> StepFunction {
        match self {
            StepError::Read { step, .. }
            | StepError::Write { step, .. }
            | StepError::Transform { step, .. } => *step,
        }
    }

    /// 1-based position of the failing step in the full sequence.
    pub fn index(&self) -> usize {
        match self {
            StepError::Read { index, .. }
            | StepError::Write { index, .. }
            | StepError::Transform { index, .. } => *index,
        }
    }

    /// File involved, when the failure is tied to one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StepError::Read { path, .. } | StepError::Write { path, .. } => Some(path),
            StepError::Transform { .. } => None,
        }
    }

    /// Whether a possibly corrupted output was left in place.
    pub fn is_partial(&self) -> bool {
        matches!(self, StepError::Write { partial: true, .. })
    }
}

/// Result type for step operations.
pub type StepResult<T> = Result<T, StepError>;
