//! Error types for the cast orchestrator.
//!
//! Every variant names the cast; `stage()` and `path()` give the stage
//! reached and the file involved.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::state::CastStage;
use crate::cast::HexHeaderError;
use crate::pipeline::StepError;
use crate::sbe::TransformError;
use crate::setup::SetupError;

/// Top-level pipeline error with cast context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A check before any side effect failed.
    #[error("Cast '{cast}' precondition failed: {message}")]
    Precondition {
        cast: String,
        message: String,
        path: Option<PathBuf>,
    },

    /// The raw header lacks the serial number or cast date.
    #[error("Cast '{cast}' precondition failed: {source}")]
    Header {
        cast: String,
        path: PathBuf,
        #[source]
        source: HexHeaderError,
    },

    /// Processing directory setup failed.
    #[error("Cast '{cast}' setup failed: {source}")]
    Setup {
        cast: String,
        stage: CastStage,
        #[source]
        source: SetupError,
    },

    /// The transformation engine could not be bound to the cast.
    #[error("Cast '{cast}' could not start processing in {}: {source}", .path.display())]
    Bind {
        cast: String,
        path: PathBuf,
        #[source]
        source: TransformError,
    },

    /// A processing step failed.
    #[error("Cast '{cast}' failed at step {} ({}): {source}", .source.index(), .source.step())]
    StepFailed {
        cast: String,
        #[source]
        source: StepError,
    },

    #[error("Cast '{cast}' cannot move from {from} to {to}")]
    InvalidTransition {
        cast: String,
        from: CastStage,
        to: CastStage,
    },
}

impl PipelineError {
    /// Create a precondition error.
    pub fn precondition(
        cast: impl Into<String>,
        message: impl Into<String>,
        path: Option<&Path>,
    ) -> Self {
        Self::Precondition {
            cast: cast.into(),
            message: message.into(),
            path: path.map(Path::to_path_buf),
        }
    }

    /// Create a setup error at the given stage.
    pub fn setup(cast: impl Into<String>, stage: CastStage, source: SetupError) -> Self {
        Self::Setup {
            cast: cast.into(),
            stage,
            source,
        }
    }

    /// Create a step failed error.
    pub fn step_failed(cast: impl Into<String>, source: StepError) -> Self {
        Self::StepFailed {
            cast: cast.into(),
            source,
        }
    }

    /// Name of the cast that failed.
    pub fn cast(&self) -> &str {
        match self {
            PipelineError::Precondition { cast, .. }
            | PipelineError::Header { cast, .. }
            | PipelineError::Setup { cast, .. }
            | PipelineError::Bind { cast, .. }
            | PipelineError::StepFailed { cast, .. }
            | PipelineError::InvalidTransition { cast, .. } => cast,
        }
    }

    /// Stage the cast had reached when it failed.
    pub fn stage(&self) -> CastStage {
        match self {
            PipelineError::Precondition { .. } | PipelineError::Header { .. } => CastStage::Pending,
            PipelineError::Setup { stage, .. } => *stage,
            PipelineError::Bind { .. } => CastStage::DirectorySetUp,
            PipelineError::StepFailed { source, .. } => {
                if source.step().is_conversion() {
                    CastStage::Converting
                } else {
                    CastStage::Stepping
                }
            }
            PipelineError::InvalidTransition { from, .. } => *from,
        }
    }

    /// Filesystem path involved, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            PipelineError::Precondition { path, .. } => path.as_deref(),
            PipelineError::Header { path, .. } | PipelineError::Bind { path, .. } => Some(path),
            PipelineError::Setup { source, .. } => source.path(),
            PipelineError::StepFailed { source, .. } => source.path(),
            PipelineError::InvalidTransition { .. } => None,
        }
    }

    /// Whether the cast was rejected before any side effect.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PipelineError::Precondition { .. } | PipelineError::Header { .. }
        )
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
