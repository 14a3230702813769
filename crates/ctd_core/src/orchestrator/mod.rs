//! Cast orchestration.
//!
//! `CastPipeline` drives one cast through resolution, setup, conversion
//! and the step chain; `BatchProcessor` runs many casts on worker threads.

mod batch;
mod cast_pipeline;
mod errors;
mod state;

pub use batch::{BatchProcessor, CastOutcome};
pub use cast_pipeline::{CastPipeline, CastReport};
pub use errors::{PipelineError, PipelineResult};
pub use state::CastStage;
