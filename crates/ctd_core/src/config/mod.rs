//! Configuration management.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load into an immutable `ConfigSnapshot`
//!
//! # Example
//!
//! ```no_run
//! use ctd_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new("config.toml");
//! let snapshot = config.load_or_create().unwrap();
//! println!("Processing root: {}", snapshot.roots().processing.display());
//!
//! config.settings_mut().options.workers = 4;
//! config.update_section(ConfigSection::Options).unwrap();
//! ```

mod manager;
mod settings;
mod snapshot;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AuditLogSettings, ConfigSection, LatitudeMethod, LoggingSettings, OptionSettings,
    PathSettings, Settings,
};
pub use snapshot::ConfigSnapshot;
