//! CTD Core - cast processing pipeline
//!
//! Takes raw `.hex` captures through configuration lookup, directory setup,
//! conversion and the configured processing steps, then archives approved
//! results. Contains no CLI dependencies.

pub mod approval;
pub mod audit;
pub mod cast;
pub mod config;
pub mod latitude;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod psa;
pub mod resolver;
pub mod sbe;
pub mod setup;

mod fsutil;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
