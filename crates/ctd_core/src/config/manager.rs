//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only modified section is changed)
//! - Validation on load, producing an immutable `ConfigSnapshot`
//! - Reload keeps the previous snapshot when the new file is invalid

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use toml_edit::DocumentMut;

use crate::fsutil;
use crate::pipeline::SequenceError;

use super::settings::{ConfigSection, Settings};
use super::snapshot::ConfigSnapshot;

/// Keys that were renamed, with the message shown to the user.
const DEPRECATED_KEYS: &[(&str, &str, &str)] =
    &[("paths", "destination", "[paths] destination renamed to approved")];

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Deprecated config keys: {}", .0.join("; "))]
    Deprecated(Vec<String>),

    #[error("Invalid processing sequence: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Configuration root does not exist: {0}")]
    MissingConfigRoot(PathBuf),

    #[error("Config has not been loaded")]
    NotLoaded,
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages application configuration.
///
/// Handles loading, saving, and atomic section-level updates.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Editable settings.
    settings: Settings,
    /// Last successfully validated configuration.
    snapshot: Option<Arc<ConfigSnapshot>>,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
            snapshot: None,
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Note: Changes made here are only in memory until `save()` or
    /// `update_section()` is called, and do not affect the snapshot until
    /// the next `reload()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Current validated snapshot.
    pub fn snapshot(&self) -> ConfigResult<Arc<ConfigSnapshot>> {
        self.snapshot.clone().ok_or(ConfigError::NotLoaded)
    }

    /// Load config from file.
    ///
    /// Returns error if file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<Arc<ConfigSnapshot>> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }
        self.reload()
    }

    /// Re-read and re-validate the file.
    ///
    /// On failure the previous settings and snapshot stay in place.
    pub fn reload(&mut self) -> ConfigResult<Arc<ConfigSnapshot>> {
        let content = fs::read_to_string(&self.config_path)?;
        let (settings, _) = self.parse_and_validate(&content)?;
        let snapshot = Arc::new(ConfigSnapshot::new(settings.clone())?.with_source(&self.config_path));

        self.settings = settings;
        self.snapshot = Some(snapshot.clone());
        tracing::info!("Loaded config from {}", self.config_path.display());
        Ok(snapshot)
    }

    /// Load config from file, creating with defaults if it doesn't exist.
    ///
    /// Sections missing from an existing file are written back with their
    /// defaults; the rest of the file is left untouched.
    pub fn load_or_create(&mut self) -> ConfigResult<Arc<ConfigSnapshot>> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, missing) = self.parse_and_validate(&content)?;
            let snapshot =
                Arc::new(ConfigSnapshot::new(settings.clone())?.with_source(&self.config_path));
            self.settings = settings;

            for section in missing {
                tracing::info!("Adding missing [{}] section", section.table_name());
                self.update_section(section)?;
            }

            self.snapshot = Some(snapshot.clone());
            Ok(snapshot)
        } else {
            self.settings = Settings::default();
            self.save()?;
            tracing::info!("Created default config at {}", self.config_path.display());
            self.reload()
        }
    }

    /// Ensure all configured directories exist.
    ///
    /// Creates raw, processing, approved and logs directories. The
    /// configuration root is not created: it must already hold the
    /// instrument folders.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let paths = &self.settings.paths;
        let ctd_config = PathBuf::from(&paths.ctd_config);
        if !ctd_config.is_dir() {
            return Err(ConfigError::MissingConfigRoot(ctd_config));
        }

        let dirs = [&paths.raw, &paths.processing, &paths.approved, &paths.logs];
        for dir in dirs {
            let path = PathBuf::from(dir);
            if !path.exists() {
                fs::create_dir_all(&path)?;
            }
        }

        Ok(())
    }

    /// Parse and validate config content.
    ///
    /// Returns the settings and the sections absent from the document.
    fn parse_and_validate(&self, content: &str) -> ConfigResult<(Settings, Vec<ConfigSection>)> {
        let doc: DocumentMut = content.parse()?;

        let deprecated: Vec<String> = DEPRECATED_KEYS
            .iter()
            .filter(|(table, key, _)| doc.get(table).and_then(|t| t.get(key)).is_some())
            .map(|(_, _, message)| message.to_string())
            .collect();
        if !deprecated.is_empty() {
            return Err(ConfigError::Deprecated(deprecated));
        }

        for (key, _) in doc.iter() {
            if !ConfigSection::ALL.iter().any(|s| s.table_name() == key) {
                tracing::warn!("Ignoring unknown config section [{}]", key);
            }
        }

        let settings: Settings = toml::from_str(content)?;
        let missing = ConfigSection::ALL
            .iter()
            .copied()
            .filter(|s| !doc.contains_key(s.table_name()))
            .collect();

        Ok((settings, missing))
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        fsutil::atomic_write(&self.config_path, content.as_bytes())?;
        Ok(())
    }

    /// Update a specific section atomically.
    ///
    /// This re-reads the file from disk, updates only the specified section,
    /// and writes back atomically. Other sections and their comments are
    /// preserved.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let table_name = section.table_name();
        let mut section_doc: DocumentMut = self.render_section(section)?.parse()?;
        if let Some(item) = section_doc.as_table_mut().remove(table_name) {
            doc[table_name] = item;
        }

        fsutil::atomic_write(&self.config_path, doc.to_string().as_bytes())?;
        Ok(())
    }

    fn render_section(&self, section: ConfigSection) -> ConfigResult<String> {
        match section {
            ConfigSection::Paths => section_toml(section, &self.settings.paths),
            ConfigSection::Logging => section_toml(section, &self.settings.logging),
            ConfigSection::Options => section_toml(section, &self.settings.options),
            ConfigSection::AuditLog => section_toml(section, &self.settings.audit_log),
        }
    }

    /// Generate config content with helpful comments.
    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();

        output.push_str("# CTD cast processing configuration\n");
        output.push_str(
            "# This file is auto-generated. Comments may be preserved on section updates.\n\n",
        );

        for section in ConfigSection::ALL {
            output.push_str(section.comment());
            output.push('\n');
            for line in self.render_section(section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
            output.push('\n');
        }

        Ok(output)
    }
}

/// Serialize one section under its table name, so nested arrays of tables
/// render as `[[options.processing_sequence]]`.
fn section_toml<T: Serialize>(section: ConfigSection, value: &T) -> ConfigResult<String> {
    let mut table = toml::Table::new();
    table.insert(section.table_name().to_string(), toml::Value::try_from(value)?);
    Ok(toml::to_string_pretty(&table)?)
}
