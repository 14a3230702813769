//! Latitude lookup services.
//!
//! Processing never defaults latitude: a cast without one fails its
//! precondition check. Services are shared across workers.

mod spreadsheet;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use spreadsheet::SpreadsheetLatitude;

/// Errors looking up latitude.
#[derive(Error, Debug)]
pub enum LatitudeError {
    #[error("No latitude found for {0}")]
    NotFound(String),

    #[error("Latitude for {base_name} is not a finite number: {value}")]
    NotFinite { base_name: String, value: f64 },

    #[error("Failed to read latitude spreadsheet {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse latitude spreadsheet {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Latitude spreadsheet {path} has no {column} column")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Invalid latitude '{value}' for {base_name} in {path}")]
    InvalidValue {
        path: PathBuf,
        base_name: String,
        value: String,
    },

    #[error("Latitude entry cancelled for {0}")]
    Cancelled(String),
}

/// Result type for latitude lookups.
pub type LatitudeResult<T> = Result<T, LatitudeError>;

/// Looks up the latitude of a cast by base name.
pub trait LatitudeService: Send + Sync {
    fn lookup(&self, base_name: &str) -> LatitudeResult<f64>;
}

/// Strip an optional `.hex` extension so names match either way.
pub(crate) fn normalize_name(name: &str) -> &str {
    let name = name.trim();
    match name.len().checked_sub(4) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".hex") => {
            &name[..cut]
        }
        _ => name,
    }
}

fn finite(base_name: &str, value: f64) -> LatitudeResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LatitudeError::NotFinite {
            base_name: base_name.to_string(),
            value,
        })
    }
}

/// Same latitude for every cast.
#[derive(Debug, Clone, Copy)]
pub struct ConstantLatitude(pub f64);

impl LatitudeService for ConstantLatitude {
    fn lookup(&self, base_name: &str) -> LatitudeResult<f64> {
        finite(base_name, self.0)
    }
}

/// Explicitly supplied latitudes, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct ManualLatitude {
    entries: HashMap<String, f64>,
}

impl ManualLatitude {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, base_name: &str, latitude: f64) {
        self.entries
            .insert(normalize_name(base_name).to_string(), latitude);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LatitudeService for ManualLatitude {
    fn lookup(&self, base_name: &str) -> LatitudeResult<f64> {
        let value = self
            .entries
            .get(normalize_name(base_name))
            .copied()
            .ok_or_else(|| LatitudeError::NotFound(base_name.to_string()))?;
        finite(base_name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_applies_to_every_cast() {
        let service = ConstantLatitude(-19.25);
        assert_eq!(service.lookup("any").unwrap(), -19.25);
        assert!(matches!(
            ConstantLatitude(f64::NAN).lookup("any"),
            Err(LatitudeError::NotFinite { .. })
        ));
    }

    #[test]
    fn manual_matches_with_or_without_extension() {
        let mut service = ManualLatitude::new();
        service.insert("WQP143.hex", -18.5);

        assert_eq!(service.lookup("WQP143").unwrap(), -18.5);
        assert_eq!(service.lookup("WQP143.HEX").unwrap(), -18.5);
        assert!(matches!(
            service.lookup("WQP144"),
            Err(LatitudeError::NotFound(_))
        ));
    }

    #[test]
    fn normalize_leaves_other_names() {
        assert_eq!(normalize_name(" a.hex "), "a");
        assert_eq!(normalize_name("hex"), "hex");
        assert_eq!(normalize_name("a.cnv"), "a.cnv");
    }
}
