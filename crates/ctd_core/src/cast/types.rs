//! Cast identity and derived paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;

use super::hex::HexHeader;

/// Extension of raw instrument captures.
pub const RAW_EXTENSION: &str = "hex";

/// Root directories a cast's paths are derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastRoots {
    /// Raw captures (`<raw>/<base>.hex`).
    pub raw: PathBuf,
    /// In-progress working directories (`<processing>/<base>/`).
    pub processing: PathBuf,
    /// Approved archive (`<approved>/<base>/`).
    pub approved: PathBuf,
}

impl CastRoots {
    pub fn new(
        raw: impl Into<PathBuf>,
        processing: impl Into<PathBuf>,
        approved: impl Into<PathBuf>,
    ) -> Self {
        Self {
            raw: raw.into(),
            processing: processing.into(),
            approved: approved.into(),
        }
    }
}

/// Where a cast currently lives in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CastLocation {
    /// Only the raw capture exists.
    Raw,
    /// A processing directory exists.
    Processing,
    /// The cast has been moved into the approved archive.
    Approved,
    /// Both a processing and an approved directory exist.
    Inconsistent,
}

impl CastLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CastLocation::Raw => "raw",
            CastLocation::Processing => "processing",
            CastLocation::Approved => "approved",
            CastLocation::Inconsistent => "inconsistent",
        }
    }
}

/// One CTD cast, identified by the base name of its raw capture.
#[derive(Debug, Clone)]
pub struct Cast {
    base_name: String,
    raw_path: PathBuf,
    processing_dir: PathBuf,
    approved_dir: PathBuf,
    latitude: Option<f64>,
    header: Option<HexHeader>,
}

impl Cast {
    /// Create a cast from its base name (the raw file name without `.hex`).
    pub fn new(base_name: impl Into<String>, roots: &CastRoots) -> Self {
        let base_name = base_name.into();
        Self {
            raw_path: roots
                .raw
                .join(format!("{}.{}", base_name, RAW_EXTENSION)),
            processing_dir: roots.processing.join(&base_name),
            approved_dir: roots.approved.join(&base_name),
            base_name,
            latitude: None,
            header: None,
        }
    }

    /// Create a cast from a raw capture path, or `None` if it is not a `.hex` file.
    pub fn from_raw_path(path: &Path, roots: &CastRoots) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if !ext.eq_ignore_ascii_case(RAW_EXTENSION) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let mut cast = Self::new(stem, roots);
        cast.raw_path = path.to_path_buf();
        Some(cast)
    }

    /// Set the latitude (builder pattern).
    pub fn with_latitude(mut self, latitude: f64) -> Self {
        self.latitude = Some(latitude);
        self
    }

    pub fn set_latitude(&mut self, latitude: Option<f64>) {
        self.latitude = latitude;
    }

    pub fn set_header(&mut self, header: HexHeader) {
        self.header = Some(header);
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn raw_path(&self) -> &Path {
        &self.raw_path
    }

    pub fn processing_dir(&self) -> &Path {
        &self.processing_dir
    }

    pub fn approved_dir(&self) -> &Path {
        &self.approved_dir
    }

    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    /// Parsed raw header, once the orchestrator has read it.
    pub fn header(&self) -> Option<&HexHeader> {
        self.header.as_ref()
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.serial_number.as_str())
    }

    pub fn cast_date(&self) -> Option<NaiveDateTime> {
        self.header.as_ref().map(|h| h.cast_date)
    }

    /// Determine the lifecycle location from the filesystem.
    pub fn location(&self) -> CastLocation {
        match (self.processing_dir.is_dir(), self.approved_dir.is_dir()) {
            (false, false) => CastLocation::Raw,
            (true, false) => CastLocation::Processing,
            (false, true) => CastLocation::Approved,
            (true, true) => CastLocation::Inconsistent,
        }
    }

    /// `.cnv` results currently in the processing directory.
    pub fn processing_outputs(&self) -> io::Result<Vec<PathBuf>> {
        list_outputs(&self.processing_dir)
    }

    /// `.cnv` results in the approved archive (`done/`).
    pub fn approved_outputs(&self) -> io::Result<Vec<PathBuf>> {
        list_outputs(&self.approved_dir.join("done"))
    }
}

/// List `.cnv` files directly inside `dir`, sorted by name.
fn list_outputs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut outputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, "cnv") {
            outputs.push(path);
        }
    }
    outputs.sort();
    Ok(outputs)
}

/// Case-insensitive extension check.
pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn roots(base: &Path) -> CastRoots {
        CastRoots::new(base.join("raw"), base.join("processing"), base.join("approved"))
    }

    #[test]
    fn paths_derive_from_base_name() {
        let roots = CastRoots::new("/data/raw", "/data/processing", "/data/approved");
        let cast = Cast::new("WQP143", &roots);

        assert_eq!(cast.raw_path(), Path::new("/data/raw/WQP143.hex"));
        assert_eq!(cast.processing_dir(), Path::new("/data/processing/WQP143"));
        assert_eq!(cast.approved_dir(), Path::new("/data/approved/WQP143"));
        assert!(cast.latitude().is_none());
    }

    #[test]
    fn from_raw_path_requires_hex() {
        let roots = CastRoots::new("/r", "/p", "/a");
        let cast = Cast::from_raw_path(Path::new("/r/trip_6169.HEX"), &roots).unwrap();
        assert_eq!(cast.base_name(), "trip_6169");
        assert_eq!(cast.raw_path(), Path::new("/r/trip_6169.HEX"));

        assert!(Cast::from_raw_path(Path::new("/r/notes.txt"), &roots).is_none());
    }

    #[test]
    fn location_follows_directories() {
        let dir = tempdir().unwrap();
        let roots = roots(dir.path());
        let cast = Cast::new("c1", &roots);
        assert_eq!(cast.location(), CastLocation::Raw);

        fs::create_dir_all(cast.processing_dir()).unwrap();
        assert_eq!(cast.location(), CastLocation::Processing);

        fs::create_dir_all(cast.approved_dir()).unwrap();
        assert_eq!(cast.location(), CastLocation::Inconsistent);

        fs::remove_dir(cast.processing_dir()).unwrap();
        assert_eq!(cast.location(), CastLocation::Approved);
    }

    #[test]
    fn processing_outputs_lists_only_cnv() {
        let dir = tempdir().unwrap();
        let roots = roots(dir.path());
        let cast = Cast::new("c1", &roots);
        fs::create_dir_all(cast.processing_dir()).unwrap();
        for name in ["c1_C.cnv", "c1_CT.cnv", "c1.hex", "Filter.psa"] {
            fs::write(cast.processing_dir().join(name), "x").unwrap();
        }

        let outputs = cast.processing_outputs().unwrap();
        let names: Vec<_> = outputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["c1_C.cnv", "c1_CT.cnv"]);
        assert!(cast.approved_outputs().unwrap().is_empty());
    }
}
