//! Latitude from a CSV spreadsheet.
//!
//! The sheet needs a file-name column and a latitude column. Headers are
//! matched case-insensitively: the first header containing `file` and the
//! first containing `lat`.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use parking_lot::RwLock;

use super::{finite, normalize_name, LatitudeError, LatitudeResult, LatitudeService};

/// Spreadsheet-backed latitude lookup. `refresh` re-reads the file.
#[derive(Debug)]
pub struct SpreadsheetLatitude {
    path: PathBuf,
    entries: RwLock<HashMap<String, f64>>,
}

impl SpreadsheetLatitude {
    /// Open and load a spreadsheet.
    pub fn open(path: impl Into<PathBuf>) -> LatitudeResult<Self> {
        let path = path.into();
        let entries = load(&path)?;
        tracing::info!("Loaded {} latitudes from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the spreadsheet. On failure the previous entries are kept.
    pub fn refresh(&self) -> LatitudeResult<usize> {
        let entries = load(&self.path)?;
        let count = entries.len();
        *self.entries.write() = entries;
        tracing::debug!("Refreshed {} latitudes from {}", count, self.path.display());
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl LatitudeService for SpreadsheetLatitude {
    fn lookup(&self, base_name: &str) -> LatitudeResult<f64> {
        let value = self
            .entries
            .read()
            .get(normalize_name(base_name))
            .copied()
            .ok_or_else(|| LatitudeError::NotFound(base_name.to_string()))?;
        finite(base_name, value)
    }
}

fn load(path: &Path) -> LatitudeResult<HashMap<String, f64>> {
    let csv_err = |source| LatitudeError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| LatitudeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(file);

    let headers = reader.headers().map_err(csv_err)?.clone();
    let find = |needle: &str| {
        headers
            .iter()
            .position(|h| h.to_ascii_lowercase().contains(needle))
    };
    let name_col = find("file").ok_or(LatitudeError::MissingColumn {
        path: path.to_path_buf(),
        column: "file name",
    })?;
    let lat_col = find("lat").ok_or(LatitudeError::MissingColumn {
        path: path.to_path_buf(),
        column: "latitude",
    })?;

    let mut entries = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let Some(name) = record.get(name_col).map(normalize_name).filter(|n| !n.is_empty()) else {
            continue;
        };
        let raw = record.get(lat_col).unwrap_or("");
        if raw.is_empty() {
            tracing::warn!("No latitude for {} in {}", name, path.display());
            continue;
        }
        let value: f64 = raw.parse().map_err(|_| LatitudeError::InvalidValue {
            path: path.to_path_buf(),
            base_name: name.to_string(),
            value: raw.to_string(),
        })?;
        entries.insert(name.to_string(), value);
    }

    Ok(entries)
}
