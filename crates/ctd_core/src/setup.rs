//! Processing directory setup.
//!
//! Materializes `<processing>/<base>/` with the raw capture, profile files
//! and exactly one descriptor. Safe to run repeatedly: existing files are
//! never overwritten, so manual fixes in the directory survive a rerun.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cast::Cast;
use crate::pipeline::ProcessingSequence;
use crate::psa::{rewrite_latitude, PsaError};
use crate::resolver::{list_with_extension, ConfigurationFolder, DescriptorError};

/// Errors setting up a processing directory.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Raw capture not found: {0}")]
    RawMissing(PathBuf),

    #[error("Processing dir has multiple xmlcon files: {0}")]
    MultipleDescriptors(PathBuf),

    #[error("No CTD config dir and no existing xmlcon files in: {0}")]
    NoDescriptor(PathBuf),

    #[error("No psa files in: {0}")]
    NoProfiles(PathBuf),

    #[error("Profile {name} referenced by the processing sequence is missing from {dir}")]
    ProfileMissing { name: String, dir: PathBuf },

    #[error("Config folder descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("I/O error in {operation} ({path}): {source}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set latitude: {0}")]
    Latitude(#[from] PsaError),
}

impl SetupError {
    /// Create an I/O error with context.
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Path the error refers to, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            SetupError::RawMissing(p)
            | SetupError::MultipleDescriptors(p)
            | SetupError::NoDescriptor(p)
            | SetupError::NoProfiles(p) => Some(p),
            SetupError::ProfileMissing { dir, .. } => Some(dir),
            SetupError::Io { path, .. } => Some(path),
            SetupError::Latitude(e) => Some(e.path()),
            SetupError::Descriptor(DescriptorError::NoDescriptor(p))
            | SetupError::Descriptor(DescriptorError::MultipleDescriptors(p))
            | SetupError::Descriptor(DescriptorError::Io { path: p, .. }) => Some(p),
        }
    }
}

/// Result type for setup operations.
pub type SetupResult<T> = Result<T, SetupError>;

/// Copy `src` into `dst_dir` unless a file of that name already exists.
///
/// Returns the destination path either way.
pub fn smart_copy_file(src: &Path, dst_dir: &Path) -> SetupResult<PathBuf> {
    let Some(name) = src.file_name() else {
        return Err(SetupError::io(
            "copy",
            src,
            io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
        ));
    };
    let dst = dst_dir.join(name);

    if dst.exists() {
        tracing::debug!("file already exists: {}", dst.display());
        return Ok(dst);
    }

    fs::copy(src, &dst).map_err(|e| SetupError::io("copy", src, e))?;
    tracing::debug!("cp {} {}", src.display(), dst.display());
    Ok(dst)
}

/// Create or verify the processing directory and return its single
/// descriptor path.
///
/// With a configuration folder, profiles are copied in and the folder's
/// descriptor is used unless one is already staged. Without one, the
/// directory must already hold one descriptor and at least one profile.
pub fn setup_processing_dir(
    cast: &Cast,
    config_folder: Option<&ConfigurationFolder>,
) -> SetupResult<PathBuf> {
    let dir = cast.processing_dir();

    if !cast.raw_path().is_file() {
        return Err(SetupError::RawMissing(cast.raw_path().to_path_buf()));
    }

    let new_dir = !dir.exists();
    fs::create_dir_all(dir).map_err(|e| SetupError::io("create processing dir", dir, e))?;
    let log_prefix = if new_dir {
        "setup new processing dir"
    } else {
        "verified existing processing dir"
    };

    smart_copy_file(cast.raw_path(), dir)?;

    let existing = list_with_extension(dir, "xmlcon")
        .map_err(|e| SetupError::io("list descriptors", dir, e))?;
    if existing.len() > 1 {
        return Err(SetupError::MultipleDescriptors(dir.to_path_buf()));
    }

    let descriptor = match config_folder {
        Some(folder) => {
            copy_profiles(&folder.path, dir)?;

            let descriptor = match existing.into_iter().next() {
                None => smart_copy_file(&folder.descriptor()?, dir)?,
                Some(staged) => {
                    match folder.descriptor() {
                        Ok(cfg) if cfg.file_name() != staged.file_name() => {
                            tracing::warn!(
                                "existing xmlcon name ({}) differs from config directory ({})",
                                file_name(&staged),
                                file_name(&cfg)
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("Existing xmlcon in processing, but CTD config has a problem: {}", e);
                        }
                    }
                    staged
                }
            };

            tracing::info!("{} {} xmlcon={}", log_prefix, dir.display(), file_name(&descriptor));
            descriptor
        }
        None => {
            let Some(staged) = existing.into_iter().next() else {
                return Err(SetupError::NoDescriptor(dir.to_path_buf()));
            };

            let profiles = list_with_extension(dir, "psa")
                .map_err(|e| SetupError::io("list profiles", dir, e))?;
            if profiles.is_empty() {
                return Err(SetupError::NoProfiles(dir.to_path_buf()));
            }

            tracing::debug!("No ctd config, but existing psa(s) and xmlcon found: {}", staged.display());
            tracing::info!(
                "{} {} xmlcon={}, no CTD config folder",
                log_prefix,
                dir.display(),
                file_name(&staged)
            );
            staged
        }
    };

    Ok(descriptor)
}

/// Write the cast latitude into every profile the sequence references.
///
/// Each profile is rewritten once even if several steps share it.
pub fn apply_latitude(
    dir: &Path,
    sequence: &ProcessingSequence,
    latitude: f64,
) -> SetupResult<()> {
    let mut seen: Vec<&str> = Vec::new();
    for name in sequence.profile_files() {
        if seen.contains(&name) {
            continue;
        }
        seen.push(name);

        let path = dir.join(name);
        if !path.is_file() {
            return Err(SetupError::ProfileMissing {
                name: name.to_string(),
                dir: dir.to_path_buf(),
            });
        }
        rewrite_latitude(&path, latitude)?;
    }
    Ok(())
}

/// Copy every `.psa` in the configuration folder.
fn copy_profiles(folder: &Path, dir: &Path) -> SetupResult<()> {
    let entries = fs::read_dir(folder).map_err(|e| SetupError::io("list config folder", folder, e))?;
    for entry in entries {
        let path = entry
            .map_err(|e| SetupError::io("list config folder", folder, e))?
            .path();
        if !crate::cast::has_extension(&path, "psa") {
            continue;
        }
        if path.is_file() {
            smart_copy_file(&path, dir)?;
        } else {
            tracing::warn!("Not a file: {}", path.display());
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::CastRoots;
    use chrono::NaiveDate;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        cast: Cast,
        folder: ConfigurationFolder,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let roots = CastRoots::new(
            dir.path().join("raw"),
            dir.path().join("processing"),
            dir.path().join("approved"),
        );
        fs::create_dir_all(&roots.raw).unwrap();
        fs::create_dir_all(&roots.processing).unwrap();
        fs::write(roots.raw.join("cast1.hex"), "*END*\n0A0B\n").unwrap();

        let folder_path = dir.path().join("config").join("7093").join("SBE19_20200101");
        fs::create_dir_all(&folder_path).unwrap();
        fs::write(folder_path.join("SBE19.xmlcon"), "<cfg/>").unwrap();
        fs::write(folder_path.join("Filter.psa"), "<filter/>").unwrap();
        fs::write(folder_path.join("DatCnv.psa"), "<datcnv/>").unwrap();
        fs::create_dir(folder_path.join("dir.psa")).unwrap();

        Fixture {
            cast: Cast::new("cast1", &roots),
            folder: ConfigurationFolder {
                path: folder_path,
                valid_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            },
            _dir: dir,
        }
    }

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let p = e.unwrap().path();
                (file_name(&p), fs::read(&p).unwrap())
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn copies_capture_profiles_and_descriptor() {
        let fx = fixture();
        let xmlcon = setup_processing_dir(&fx.cast, Some(&fx.folder)).unwrap();

        let dir = fx.cast.processing_dir();
        assert_eq!(xmlcon, dir.join("SBE19.xmlcon"));
        assert!(dir.join("cast1.hex").is_file());
        assert!(dir.join("Filter.psa").is_file());
        assert!(dir.join("DatCnv.psa").is_file());
        assert!(!dir.join("dir.psa").exists());
    }

    #[test]
    fn second_setup_is_identical() {
        let fx = fixture();
        setup_processing_dir(&fx.cast, Some(&fx.folder)).unwrap();
        let before = snapshot(fx.cast.processing_dir());

        setup_processing_dir(&fx.cast, Some(&fx.folder)).unwrap();
        assert_eq!(snapshot(fx.cast.processing_dir()), before);
    }

    #[test]
    fn existing_files_are_never_overwritten() {
        let fx = fixture();
        let dir = fx.cast.processing_dir();
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("Filter.psa"), "edited by hand").unwrap();

        setup_processing_dir(&fx.cast, Some(&fx.folder)).unwrap();
        assert_eq!(fs::read_to_string(dir.join("Filter.psa")).unwrap(), "edited by hand");
    }

    #[test]
    fn staged_descriptor_is_kept() {
        let fx = fixture();
        let dir = fx.cast.processing_dir();
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("Manual.xmlcon"), "<manual/>").unwrap();

        let xmlcon = setup_processing_dir(&fx.cast, Some(&fx.folder)).unwrap();
        assert_eq!(xmlcon, dir.join("Manual.xmlcon"));
        assert!(!dir.join("SBE19.xmlcon").exists());
    }

    #[test]
    fn two_descriptors_always_fail() {
        let fx = fixture();
        let dir = fx.cast.processing_dir();
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("a.xmlcon"), "").unwrap();
        fs::write(dir.join("b.xmlcon"), "").unwrap();

        assert!(matches!(
            setup_processing_dir(&fx.cast, Some(&fx.folder)),
            Err(SetupError::MultipleDescriptors(_))
        ));
        assert!(matches!(
            setup_processing_dir(&fx.cast, None),
            Err(SetupError::MultipleDescriptors(_))
        ));
    }

    #[test]
    fn without_config_folder_requires_staged_files() {
        let fx = fixture();
        let dir = fx.cast.processing_dir();

        assert!(matches!(
            setup_processing_dir(&fx.cast, None),
            Err(SetupError::NoDescriptor(_))
        ));

        fs::write(dir.join("SBE19.xmlcon"), "<cfg/>").unwrap();
        assert!(matches!(
            setup_processing_dir(&fx.cast, None),
            Err(SetupError::NoProfiles(_))
        ));

        fs::write(dir.join("Filter.psa"), "<f/>").unwrap();
        assert_eq!(
            setup_processing_dir(&fx.cast, None).unwrap(),
            dir.join("SBE19.xmlcon")
        );
    }

    #[test]
    fn latitude_goes_into_referenced_profiles() {
        let fx = fixture();
        let dir = fx.cast.processing_dir();
        fs::create_dir_all(dir).unwrap();
        let profile = "<P><Latitude value=\"0\"/></P>";
        for name in ["DatCnv.psa", "CellTM.psa", "Filter.psa", "AlignCTD.psa", "LoopEdit.psa", "Derive.psa"] {
            fs::write(dir.join(name), profile).unwrap();
        }

        let err = apply_latitude(dir, &ProcessingSequence::default(), -19.5).unwrap_err();
        assert!(matches!(err, SetupError::ProfileMissing { ref name, .. } if name == "BinAvg.psa"));

        fs::write(dir.join("BinAvg.psa"), profile).unwrap();
        apply_latitude(dir, &ProcessingSequence::default(), -19.5).unwrap();
        assert_eq!(
            fs::read_to_string(dir.join("Derive.psa")).unwrap(),
            "<P><Latitude value=\"-19.5\"/></P>"
        );
    }

    #[test]
    fn missing_raw_capture_is_fatal() {
        let fx = fixture();
        fs::remove_file(fx.cast.raw_path()).unwrap();
        assert!(matches!(
            setup_processing_dir(&fx.cast, Some(&fx.folder)),
            Err(SetupError::RawMissing(_))
        ));
        assert!(!fx.cast.processing_dir().exists());
    }
}
