//! Immutable, validated view of the configuration.

use std::path::{Path, PathBuf};

use crate::cast::CastRoots;
use crate::pipeline::ProcessingSequence;

use super::manager::{ConfigError, ConfigResult};
use super::settings::{LatitudeMethod, Settings};

/// Validated settings plus the parsed processing sequence.
///
/// Built once per load and shared between workers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    settings: Settings,
    sequence: ProcessingSequence,
    source: Option<PathBuf>,
}

impl ConfigSnapshot {
    /// Validate settings into a snapshot.
    pub fn new(settings: Settings) -> ConfigResult<Self> {
        let sequence = ProcessingSequence::from_entries(&settings.options.processing_sequence)?;

        let options = &settings.options;
        match options.latitude_method {
            LatitudeMethod::Constant => match options.constant_latitude {
                Some(lat) if lat.is_finite() => {}
                _ => {
                    return Err(ConfigError::Invalid(
                        "latitude_method = \"constant\" requires a finite constant_latitude"
                            .to_string(),
                    ))
                }
            },
            LatitudeMethod::Spreadsheet => {
                if options.latitude_spreadsheet_file.is_none() {
                    return Err(ConfigError::Invalid(
                        "latitude_method = \"spreadsheet\" requires latitude_spreadsheet_file"
                            .to_string(),
                    ));
                }
            }
            LatitudeMethod::Ask => {}
        }

        if options.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }

        Ok(Self {
            settings,
            sequence,
            source: None,
        })
    }

    pub(crate) fn with_source(mut self, path: &Path) -> Self {
        self.source = Some(path.to_path_buf());
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sequence(&self) -> &ProcessingSequence {
        &self.sequence
    }

    /// File the snapshot was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn roots(&self) -> CastRoots {
        let paths = &self.settings.paths;
        CastRoots::new(&paths.raw, &paths.processing, &paths.approved)
    }

    pub fn config_root(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.ctd_config)
    }

    pub fn sbe_bin(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.sbe_bin)
    }

    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.logs)
    }

    /// Audit file, `None` when auditing is disabled.
    pub fn audit_log_path(&self) -> Option<PathBuf> {
        self.settings.audit_log.file.as_ref().map(PathBuf::from)
    }

    pub fn latitude_spreadsheet(&self) -> Option<PathBuf> {
        self.settings
            .options
            .latitude_spreadsheet_file
            .as_ref()
            .map(PathBuf::from)
    }
}
