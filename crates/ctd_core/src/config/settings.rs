//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::pipeline::{default_step_entries, StepEntry};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Directory roots and tool locations.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Processing options.
    #[serde(default)]
    pub options: OptionSettings,

    /// Audit trail.
    #[serde(default)]
    pub audit_log: AuditLogSettings,
}

/// Directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Raw `.hex` captures.
    #[serde(default = "default_raw")]
    pub raw: String,

    /// Per-cast working directories.
    #[serde(default = "default_processing")]
    pub processing: String,

    /// Approved archive.
    #[serde(default = "default_approved")]
    pub approved: String,

    /// Root of the per-instrument configuration folders.
    #[serde(default = "default_ctd_config")]
    pub ctd_config: String,

    /// SBE Data Processing install directory.
    #[serde(default = "default_sbe_bin")]
    pub sbe_bin: String,

    /// Folder for application and per-cast logs.
    #[serde(default = "default_logs")]
    pub logs: String,
}

fn default_raw() -> String {
    "raw".to_string()
}

fn default_processing() -> String {
    "processing".to_string()
}

fn default_approved() -> String {
    "approved".to_string()
}

fn default_ctd_config() -> String {
    "ctd_config".to_string()
}

fn default_sbe_bin() -> String {
    r"C:\Program Files (x86)\Sea-Bird\SBEDataProcessing-Win32".to_string()
}

fn default_logs() -> String {
    "logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            raw: default_raw(),
            processing: default_processing(),
            approved: default_approved(),
            ctd_config: default_ctd_config(),
            sbe_bin: default_sbe_bin(),
            logs: default_logs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is not set.
    #[serde(default)]
    pub level: LogLevel,

    /// Write a daily application log into the logs folder.
    #[serde(default = "default_true")]
    pub file_log: bool,

    /// Write one log file per cast into the logs folder.
    #[serde(default = "default_true")]
    pub cast_logs: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            file_log: true,
            cast_logs: true,
        }
    }
}

/// Where a cast's latitude comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatitudeMethod {
    /// `options.constant_latitude` for every cast.
    Constant,
    /// Looked up in `options.latitude_spreadsheet_file`.
    Spreadsheet,
    /// Prompted for each cast.
    #[default]
    Ask,
}

/// Processing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSettings {
    #[serde(default)]
    pub latitude_method: LatitudeMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_latitude: Option<f64>,

    /// CSV file with a file-name column and a latitude column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude_spreadsheet_file: Option<String>,

    /// Number of casts processed concurrently in batch mode.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Log every intermediate output to the audit log, not only the final one.
    #[serde(default)]
    pub audit_each_step: bool,

    /// Ordered processing steps.
    #[serde(default = "default_step_entries")]
    pub processing_sequence: Vec<StepEntry>,
}

fn default_workers() -> usize {
    1
}

impl Default for OptionSettings {
    fn default() -> Self {
        Self {
            latitude_method: LatitudeMethod::default(),
            constant_latitude: None,
            latitude_spreadsheet_file: None,
            workers: default_workers(),
            audit_each_step: false,
            processing_sequence: default_step_entries(),
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogSettings {
    /// CSV audit file. Auditing is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Replace a cast's previous row instead of appending.
    #[serde(default)]
    pub update_rows: bool,
}

/// Config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Options,
    AuditLog,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 4] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Options,
        ConfigSection::AuditLog,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Options => "options",
            ConfigSection::AuditLog => "audit_log",
        }
    }

    /// Comment written above the section in generated files.
    pub(crate) fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "# Directory roots and tool locations",
            ConfigSection::Logging => "# Logging configuration",
            ConfigSection::Options => "# Latitude source, workers and processing sequence",
            ConfigSection::AuditLog => "# CSV audit trail (remove `file` to disable)",
        }
    }
}
