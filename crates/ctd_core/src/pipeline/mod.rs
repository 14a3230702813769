//! Step pipeline: processing sequence, filename chain and the step runner.

mod chain;
mod errors;
mod runner;
mod sequence;

pub use chain::{StepChain, CONVERSION_CODE, OUTPUT_EXTENSION};
pub use errors::{StepError, StepResult};
pub use runner::StepPipeline;
pub use sequence::{
    default_step_entries, ProcessingSequence, SequenceError, StepDescriptor, StepEntry,
    StepFunction,
};
