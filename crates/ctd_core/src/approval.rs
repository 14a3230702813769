//! Approval: move a processing directory into the approved archive.
//!
//! Layout after approval:
//!
//! ```text
//! <approved>/<base>/
//!   raw/     .hex
//!   done/    .cnv
//!   psa/     .psa
//!   config/  .xmlcon
//!   approve_comment.txt   (only with a comment)
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;

use crate::audit::{AuditError, AuditSink};
use crate::cast::{has_extension, Cast};

/// File holding the approval timestamp and comment.
pub const COMMENT_FILE: &str = "approve_comment.txt";

/// Errors approving a cast.
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("destination directory already exists: {0}")]
    AlreadyApproved(PathBuf),

    #[error("no processing directory to approve: {0}")]
    NotInProcessing(PathBuf),

    #[error("approval comment already exists: {0}")]
    CommentExists(PathBuf),

    #[error("I/O error in {operation} ({path}): {source}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ApprovalError {
    fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ApprovalError::AlreadyApproved(p)
            | ApprovalError::NotInProcessing(p)
            | ApprovalError::CommentExists(p) => p,
            ApprovalError::Io { path, .. } => path,
        }
    }
}

/// Result type for approval.
pub type ApprovalResult<T> = Result<T, ApprovalError>;

/// Role subdirectory for a file, by extension.
fn role_dir(path: &Path) -> Option<&'static str> {
    [("cnv", "done"), ("psa", "psa"), ("xmlcon", "config"), ("hex", "raw")]
        .into_iter()
        .find(|(ext, _)| has_extension(path, ext))
        .map(|(_, dir)| dir)
}

/// What happened with the audit record for an approval.
#[derive(Debug)]
pub enum AuditStatus {
    NotConfigured,
    /// The deliverable that was recorded.
    Logged(PathBuf),
    /// `done/` held no `.cnv` to record.
    NoDeliverable,
    Failed(AuditError),
}

/// Result of a successful approval.
#[derive(Debug)]
pub struct ApprovalOutcome {
    pub approved_dir: PathBuf,
    /// Top-level files left in place because of an unknown extension.
    pub unsorted: Vec<PathBuf>,
    pub comment_file: Option<PathBuf>,
    pub audit: AuditStatus,
}

/// Approve a cast.
///
/// Fails without touching anything if the cast is already approved or has
/// no processing directory.
pub fn approve(
    cast: &Cast,
    comment: &str,
    audit: Option<&dyn AuditSink>,
) -> ApprovalResult<ApprovalOutcome> {
    let approved = cast.approved_dir();
    let processing = cast.processing_dir();
    let comment = comment.trim();

    if approved.exists() {
        return Err(ApprovalError::AlreadyApproved(approved.to_path_buf()));
    }
    if !processing.is_dir() {
        return Err(ApprovalError::NotInProcessing(processing.to_path_buf()));
    }

    tracing::info!("Approved: mv {} {}", processing.display(), approved.display());
    move_dir(processing, approved)?;

    for sub in ["raw", "done", "psa", "config"] {
        let dir = approved.join(sub);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!("subdirectory already existed in processing? {}", dir.display());
            }
            Err(e) => return Err(ApprovalError::io("create subdirectory", dir, e)),
        }
    }

    let unsorted = sort_files(approved)?;

    let comment_file = if comment.is_empty() {
        None
    } else {
        Some(write_comment(approved, comment)?)
    };

    let audit = match audit {
        None => AuditStatus::NotConfigured,
        Some(sink) => record_approval(cast, comment, sink),
    };

    Ok(ApprovalOutcome {
        approved_dir: approved.to_path_buf(),
        unsorted,
        comment_file,
        audit,
    })
}

/// Pick the final deliverable: the longest file name, ties broken by the
/// lexicographically greatest name.
pub fn select_final_deliverable(outputs: &[PathBuf]) -> Option<&PathBuf> {
    outputs.iter().max_by(|a, b| {
        let (a, b) = (a.file_name().unwrap_or_default(), b.file_name().unwrap_or_default());
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    })
}

/// Rename, falling back to copy-then-remove only across devices.
fn move_dir(from: &Path, to: &Path) -> ApprovalResult<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!("rename crosses devices, copying {}", from.display());
            copy_dir_recursive(from, to)?;
            fs::remove_dir_all(from).map_err(|e| ApprovalError::io("remove processing dir", from, e))
        }
        Err(e) => Err(ApprovalError::io("move to approved", from, e)),
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> ApprovalResult<()> {
    fs::create_dir_all(to).map_err(|e| ApprovalError::io("create dir", to, e))?;
    let entries = fs::read_dir(from).map_err(|e| ApprovalError::io("list dir", from, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ApprovalError::io("list dir", from, e))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if src.is_dir() {
            copy_dir_recursive(&src, &dst)?;
        } else {
            fs::copy(&src, &dst).map_err(|e| ApprovalError::io("copy", &src, e))?;
        }
    }
    Ok(())
}

/// Move each top-level file into its role directory; return the rest.
fn sort_files(approved: &Path) -> ApprovalResult<Vec<PathBuf>> {
    let mut unsorted = Vec::new();
    let entries = fs::read_dir(approved).map_err(|e| ApprovalError::io("list dir", approved, e))?;

    for entry in entries {
        let path = entry
            .map_err(|e| ApprovalError::io("list dir", approved, e))?
            .path();
        if !path.is_file() {
            continue;
        }

        match (role_dir(&path), path.file_name()) {
            (Some(sub), Some(name)) => {
                let dest = approved.join(sub).join(name);
                fs::rename(&path, &dest).map_err(|e| ApprovalError::io("move file", &path, e))?;
            }
            _ => {
                tracing::warn!("unexpected file in approved dir: {}", path.display());
                unsorted.push(path);
            }
        }
    }

    unsorted.sort();
    Ok(unsorted)
}

fn write_comment(approved: &Path, comment: &str) -> ApprovalResult<PathBuf> {
    let path = approved.join(COMMENT_FILE);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                ApprovalError::CommentExists(path.clone())
            } else {
                ApprovalError::io("write comment", &path, e)
            }
        })?;

    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
    writeln!(file, "{}\n{}", stamp, comment)
        .map_err(|e| ApprovalError::io("write comment", &path, e))?;
    Ok(path)
}

fn record_approval(cast: &Cast, comment: &str, sink: &dyn AuditSink) -> AuditStatus {
    let outputs = match cast.approved_outputs() {
        Ok(outputs) => outputs,
        Err(source) => {
            return AuditStatus::Failed(AuditError::Io {
                path: cast.approved_dir().join("done"),
                source,
            })
        }
    };

    let Some(deliverable) = select_final_deliverable(&outputs) else {
        tracing::warn!("No .cnv files to record for approved cast {}", cast.base_name());
        return AuditStatus::NoDeliverable;
    };

    let logged = sink
        .log_approved(cast, deliverable, comment)
        .and_then(|_| sink.flush());
    match logged {
        Ok(()) => AuditStatus::Logged(deliverable.clone()),
        Err(e) => {
            tracing::error!("Failed to audit approval of {}: {}", cast.base_name(), e);
            AuditStatus::Failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditResult, StepAuditInfo};
    use crate::cast::CastRoots;
    use parking_lot::Mutex;
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct RecordingAudit {
        approved: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl AuditSink for RecordingAudit {
        fn log_step(&self, _: &Cast, _: &Path, _: &StepAuditInfo) -> AuditResult<()> {
            Ok(())
        }

        fn log_approved(&self, cast: &Cast, output: &Path, comment: &str) -> AuditResult<()> {
            if self.fail {
                return Err(AuditError::Io {
                    path: output.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::Other, "read-only"),
                });
            }
            let name = output.file_name().unwrap().to_string_lossy().to_string();
            self.approved.lock().push((cast.base_name().to_string(), name + "|" + comment));
            Ok(())
        }

        fn flush(&self) -> AuditResult<()> {
            Ok(())
        }
    }

    fn processed_cast() -> (TempDir, Cast) {
        let dir = tempdir().unwrap();
        let roots = CastRoots::new(
            dir.path().join("raw"),
            dir.path().join("processing"),
            dir.path().join("approved"),
        );
        fs::create_dir_all(&roots.approved).unwrap();
        let cast = Cast::new("c1", &roots);
        let proc = cast.processing_dir();
        fs::create_dir_all(proc).unwrap();
        for name in [
            "c1.hex",
            "c1_C.cnv",
            "c1_CT.cnv",
            "c1_CTF.cnv",
            "Filter.psa",
            "SBE19.xmlcon",
            "notes.txt",
        ] {
            fs::write(proc.join(name), name).unwrap();
        }
        (dir, cast)
    }

    #[test]
    fn files_are_partitioned_by_extension() {
        let (_dir, cast) = processed_cast();
        let outcome = approve(&cast, "", None).unwrap();
        let a = cast.approved_dir();

        assert!(!cast.processing_dir().exists());
        assert!(a.join("raw/c1.hex").is_file());
        assert!(a.join("done/c1_CTF.cnv").is_file());
        assert!(a.join("psa/Filter.psa").is_file());
        assert!(a.join("config/SBE19.xmlcon").is_file());
        assert_eq!(outcome.unsorted, vec![a.join("notes.txt")]);
        assert!(outcome.comment_file.is_none());
        assert!(matches!(outcome.audit, AuditStatus::NotConfigured));
    }

    #[test]
    fn approval_is_one_shot() {
        let (_dir, cast) = processed_cast();
        approve(&cast, "", None).unwrap();

        fs::create_dir_all(cast.processing_dir()).unwrap();
        let err = approve(&cast, "", None).unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyApproved(_)));
        assert!(cast.processing_dir().exists());
    }

    #[test]
    fn missing_processing_dir_is_reported() {
        let (_dir, cast) = processed_cast();
        fs::remove_dir_all(cast.processing_dir()).unwrap();
        assert!(matches!(
            approve(&cast, "", None),
            Err(ApprovalError::NotInProcessing(_))
        ));
    }

    #[test]
    fn comment_is_written_with_timestamp() {
        let (_dir, cast) = processed_cast();
        let outcome = approve(&cast, "  checked spikes  ", None).unwrap();

        let path = outcome.comment_file.unwrap();
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "checked spikes");
    }

    #[test]
    fn preexisting_subdirectories_are_tolerated() {
        let (_dir, cast) = processed_cast();
        fs::create_dir(cast.processing_dir().join("done")).unwrap();
        approve(&cast, "", None).unwrap();
        assert!(cast.approved_dir().join("done/c1_C.cnv").is_file());
    }

    #[test]
    fn longest_name_is_the_deliverable() {
        let outputs = vec![
            PathBuf::from("c1_C.cnv"),
            PathBuf::from("c1_CTF.cnv"),
            PathBuf::from("c1_CT.cnv"),
        ];
        assert_eq!(
            select_final_deliverable(&outputs),
            Some(&PathBuf::from("c1_CTF.cnv"))
        );

        let tied = vec![PathBuf::from("c1_CA.cnv"), PathBuf::from("c1_CB.cnv")];
        assert_eq!(select_final_deliverable(&tied), Some(&PathBuf::from("c1_CB.cnv")));
        assert_eq!(select_final_deliverable(&[]), None);
    }

    #[test]
    fn audit_records_deliverable_and_failure_does_not_raise() {
        let (_dir, cast) = processed_cast();
        let sink = RecordingAudit::default();
        let outcome = approve(&cast, "ok", Some(&sink)).unwrap();
        assert!(matches!(outcome.audit, AuditStatus::Logged(ref p) if p.ends_with("c1_CTF.cnv")));
        assert_eq!(sink.approved.lock()[0].1, "c1_CTF.cnv|ok");

        let (_dir2, cast2) = processed_cast();
        let failing = RecordingAudit {
            fail: true,
            ..Default::default()
        };
        let outcome = approve(&cast2, "", Some(&failing)).unwrap();
        assert!(matches!(outcome.audit, AuditStatus::Failed(_)));
        assert!(cast2.approved_dir().join("done").is_dir());
    }
}
