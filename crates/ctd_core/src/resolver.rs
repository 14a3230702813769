//! Configuration folder resolution.
//!
//! Instrument configurations live under `<config_root>/<serial>/` in
//! folders whose names end with the `YYYYMMDD` date they take effect. A
//! cast uses the most recent folder dated on or before the cast.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::cast::has_extension;

/// Length of the trailing date in a configuration folder name.
const DATE_SUFFIX_LEN: usize = 8;

/// Errors resolving a configuration folder.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("CTD config directory not found for serial number {serial_number}: {path}")]
    SerialNotFound { serial_number: String, path: PathBuf },

    #[error("No config folder found for serial_number={serial_number}, cast_date={cast_date} in {path}")]
    NoQualifyingFolder {
        serial_number: String,
        cast_date: NaiveDateTime,
        path: PathBuf,
    },

    #[error("Config folders {first} and {second} share the date {date}")]
    Ambiguous {
        date: NaiveDate,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ResolveError {
    /// Path the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            ResolveError::SerialNotFound { path, .. }
            | ResolveError::NoQualifyingFolder { path, .. }
            | ResolveError::Io { path, .. } => path,
            ResolveError::Ambiguous { first, .. } => first,
        }
    }
}

/// Errors locating the descriptor (`.xmlcon`) inside a folder.
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("No .xmlcon files in: {0}")]
    NoDescriptor(PathBuf),

    #[error("Multiple .xmlcon files in: {0}")]
    MultipleDescriptors(PathBuf),

    #[error("Failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A dated configuration folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationFolder {
    pub path: PathBuf,
    /// Date from which this configuration is valid.
    pub valid_from: NaiveDate,
}

impl ConfigurationFolder {
    /// The folder's single `.xmlcon` descriptor.
    pub fn descriptor(&self) -> Result<PathBuf, DescriptorError> {
        find_descriptor(&self.path)
    }
}

/// Resolve the configuration folder for a serial number and cast date.
///
/// Candidates are sorted by parsed date and the latest one not after the
/// cast date wins. Folders whose name does not end in a valid date are
/// skipped individually.
pub fn resolve_config_folder(
    serial_number: &str,
    cast_date: NaiveDateTime,
    config_root: &Path,
) -> Result<ConfigurationFolder, ResolveError> {
    let serial_dir = config_root.join(serial_number);
    if !serial_dir.is_dir() {
        return Err(ResolveError::SerialNotFound {
            serial_number: serial_number.to_string(),
            path: serial_dir,
        });
    }

    tracing::debug!(
        "Checking configuration directory {} for subdirectory relevant to {} cast date",
        serial_dir.display(),
        cast_date
    );

    let io_err = |source| ResolveError::Io {
        path: serial_dir.clone(),
        source,
    };

    let cast_day = cast_date.date();
    let mut candidates = Vec::new();
    for entry in fs::read_dir(&serial_dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_dir() {
            continue;
        }

        let Some(valid_from) = folder_date(&path) else {
            tracing::warn!("Skipping config folder without a YYYYMMDD suffix: {}", path.display());
            continue;
        };

        if valid_from <= cast_day {
            candidates.push(ConfigurationFolder { path, valid_from });
        } else {
            tracing::trace!("Config folder {} is newer than the cast", path.display());
        }
    }

    candidates.sort_by(|a, b| a.valid_from.cmp(&b.valid_from).then_with(|| a.path.cmp(&b.path)));

    let Some(best) = candidates.pop() else {
        return Err(ResolveError::NoQualifyingFolder {
            serial_number: serial_number.to_string(),
            cast_date,
            path: serial_dir,
        });
    };

    if let Some(runner_up) = candidates.last() {
        if runner_up.valid_from == best.valid_from {
            return Err(ResolveError::Ambiguous {
                date: best.valid_from,
                first: runner_up.path.clone(),
                second: best.path,
            });
        }
    }

    Ok(best)
}

/// Parse the trailing `YYYYMMDD` of a folder name.
fn folder_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    if name.len() < DATE_SUFFIX_LEN || !name.is_char_boundary(name.len() - DATE_SUFFIX_LEN) {
        return None;
    }
    let suffix = &name[name.len() - DATE_SUFFIX_LEN..];
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(suffix, "%Y%m%d").ok()
}

/// Find the single `.xmlcon` regular file in a folder.
pub fn find_descriptor(folder: &Path) -> Result<PathBuf, DescriptorError> {
    let descriptors = list_with_extension(folder, "xmlcon").map_err(|source| {
        DescriptorError::Io {
            path: folder.to_path_buf(),
            source,
        }
    })?;

    match descriptors.len() {
        0 => Err(DescriptorError::NoDescriptor(folder.to_path_buf())),
        1 => Ok(descriptors.into_iter().next().unwrap_or_default()),
        _ => Err(DescriptorError::MultipleDescriptors(folder.to_path_buf())),
    }
}

/// Regular files in `dir` with the given extension, sorted.
pub(crate) fn list_with_extension(dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, ext) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn config_root_with(folders: &[&str]) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for folder in folders {
            fs::create_dir_all(dir.path().join("7093").join(folder)).unwrap();
        }
        dir
    }

    fn resolved_name(result: Result<ConfigurationFolder, ResolveError>) -> String {
        result
            .unwrap()
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string()
    }

    #[test]
    fn picks_latest_folder_not_after_cast() {
        // Created out of date order on purpose.
        let root = config_root_with(&["SBE19_20220301", "SBE19_20200101", "SBE19_20210601"]);

        let name = resolved_name(resolve_config_folder("7093", date(2021, 12, 1), root.path()));
        assert_eq!(name, "SBE19_20210601");

        let name = resolved_name(resolve_config_folder("7093", date(2022, 12, 1), root.path()));
        assert_eq!(name, "SBE19_20220301");
    }

    #[test]
    fn cast_before_all_folders_is_not_found() {
        let root = config_root_with(&["20200101", "20210601", "20220301"]);
        let err = resolve_config_folder("7093", date(2019, 1, 1), root.path()).unwrap_err();
        assert!(matches!(err, ResolveError::NoQualifyingFolder { .. }));
    }

    #[test]
    fn same_day_counts_as_valid() {
        let root = config_root_with(&["20200101", "20210601"]);
        let cast = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let name = resolved_name(resolve_config_folder("7093", cast, root.path()));
        assert_eq!(name, "20210601");
    }

    #[test]
    fn unknown_serial_is_not_found() {
        let root = config_root_with(&["20200101"]);
        let err = resolve_config_folder("9999", date(2021, 1, 1), root.path()).unwrap_err();
        assert!(matches!(err, ResolveError::SerialNotFound { .. }));
        assert!(err.path().ends_with("9999"));
    }

    #[test]
    fn unparseable_folders_are_skipped() {
        let root = config_root_with(&["old", "cfg_2020XX01", "cfg_20201301", "cfg_20200101"]);
        fs::write(root.path().join("7093").join("notes_20210101"), "file").unwrap();

        let name = resolved_name(resolve_config_folder("7093", date(2021, 6, 1), root.path()));
        assert_eq!(name, "cfg_20200101");
    }

    #[test]
    fn equal_dates_are_ambiguous() {
        let root = config_root_with(&["a_20200101", "b_20200101"]);
        let err = resolve_config_folder("7093", date(2021, 1, 1), root.path()).unwrap_err();
        assert!(matches!(err, ResolveError::Ambiguous { .. }));
    }

    #[test]
    fn descriptor_must_be_unique() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            find_descriptor(dir.path()),
            Err(DescriptorError::NoDescriptor(_))
        ));

        fs::write(dir.path().join("SBE19.xmlcon"), "<x/>").unwrap();
        assert_eq!(
            find_descriptor(dir.path()).unwrap(),
            dir.path().join("SBE19.xmlcon")
        );

        fs::write(dir.path().join("other.xmlcon"), "<x/>").unwrap();
        assert!(matches!(
            find_descriptor(dir.path()),
            Err(DescriptorError::MultipleDescriptors(_))
        ));
    }
}
