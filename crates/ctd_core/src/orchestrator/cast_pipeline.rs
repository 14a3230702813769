//! Per-cast orchestration.
//!
//! Runs one cast from raw capture to final `.cnv`: preconditions, header,
//! configuration folder, directory setup, latitude, conversion, steps and
//! audit. Nothing touches the filesystem until every precondition holds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audit::{AuditError, AuditSink, StepAuditInfo};
use crate::cast::{Cast, HexHeader};
use crate::config::ConfigSnapshot;
use crate::logging::{CastLogger, LogConfig};
use crate::pipeline::StepPipeline;
use crate::progress::{ProgressEvent, ProgressSender};
use crate::resolver::{resolve_config_folder, ConfigurationFolder, ResolveError};
use crate::sbe::{TransformBinding, TransformFactory};
use crate::setup::{apply_latitude, setup_processing_dir};

use super::errors::{PipelineError, PipelineResult};
use super::state::CastStage;

/// Result of a successfully processed cast.
#[derive(Debug)]
pub struct CastReport {
    pub cast: String,
    /// Last output of the chain.
    pub final_output: PathBuf,
    /// Descriptor used by the conversion.
    pub descriptor: PathBuf,
    /// Configuration folder, `None` when pre-staged files were used.
    pub config_folder: Option<ConfigurationFolder>,
    /// Why no configuration folder was used.
    pub resolve_error: Option<ResolveError>,
    /// Audit failures; the cast itself still succeeded.
    pub audit_errors: Vec<AuditError>,
    pub stage: CastStage,
}

/// Tracks the stage of one cast and rejects illegal transitions.
struct StageTracker<'a> {
    cast: &'a str,
    stage: CastStage,
}

impl<'a> StageTracker<'a> {
    fn new(cast: &'a str) -> Self {
        Self {
            cast,
            stage: CastStage::Pending,
        }
    }

    fn advance(&mut self, next: CastStage) -> PipelineResult<()> {
        if !self.stage.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                cast: self.cast.to_string(),
                from: self.stage,
                to: next,
            });
        }
        tracing::debug!("{}: {} -> {}", self.cast, self.stage, next);
        self.stage = next;
        Ok(())
    }

    fn fail(&mut self) {
        if self.stage.can_transition_to(CastStage::Failed) {
            self.stage = CastStage::Failed;
        }
    }
}

/// Optional per-cast log file.
struct Journal(Option<CastLogger>);

impl Journal {
    fn phase(&self, name: &str) {
        if let Some(logger) = &self.0 {
            logger.phase(name);
        }
    }

    fn info(&self, message: &str) {
        if let Some(logger) = &self.0 {
            logger.info(message);
        }
    }

    fn command(&self, command: &str) {
        if let Some(logger) = &self.0 {
            if !command.is_empty() {
                logger.command(command);
            }
        }
    }

    fn warn(&self, message: &str) {
        if let Some(logger) = &self.0 {
            logger.warn(message);
        }
    }

    fn error(&self, message: &str) {
        if let Some(logger) = &self.0 {
            logger.error(message);
        }
    }

    fn success(&self, message: &str) {
        if let Some(logger) = &self.0 {
            logger.success(message);
        }
    }
}

/// Processes single casts against one configuration snapshot.
///
/// Shared by reference between batch workers.
pub struct CastPipeline {
    config: Arc<ConfigSnapshot>,
    transforms: Arc<dyn TransformFactory>,
    audit: Option<Arc<dyn AuditSink>>,
    progress: ProgressSender,
    exist_ok: bool,
    cast_logs: Option<PathBuf>,
}

impl CastPipeline {
    pub fn new(config: Arc<ConfigSnapshot>, transforms: Arc<dyn TransformFactory>) -> Self {
        Self {
            config,
            transforms,
            audit: None,
            progress: ProgressSender::disabled(),
            exist_ok: true,
            cast_logs: None,
        }
    }

    /// Record outputs in this audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// Whether an existing processing directory may be reused.
    pub fn exist_ok(mut self, exist_ok: bool) -> Self {
        self.exist_ok = exist_ok;
        self
    }

    /// Write a `<base>.log` per cast into `dir`.
    pub fn with_cast_logs(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cast_logs = Some(dir.into());
        self
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    /// Process one cast end to end.
    ///
    /// The cast's header is filled in from its raw capture. On failure,
    /// outputs already written stay in the processing directory and the
    /// audit sink is still flushed; a flush error is appended to the
    /// `CastFailed` progress message.
    pub fn process_cast(&self, cast: &mut Cast) -> PipelineResult<CastReport> {
        let name = cast.base_name().to_string();
        self.progress.send(ProgressEvent::CastStarted { cast: name.clone() });

        let journal = self.open_journal(&name);
        let mut tracker = StageTracker::new(&name);

        let result = self.run_stages(cast, &mut tracker, &journal);
        match &result {
            Ok(report) => {
                tracing::info!("{} processed: {}", name, report.final_output.display());
                journal.success(&format!("Final output {}", report.final_output.display()));
                self.progress.send(ProgressEvent::CastCompleted {
                    cast: name.clone(),
                    output: report.final_output.display().to_string(),
                });
            }
            Err(e) => {
                tracker.fail();
                tracing::error!("{}", e);
                journal.error(&e.to_string());
                let mut message = e.to_string();
                // Step rows recorded before the failure still reach disk.
                if let Some(Err(flush)) = self.audit.as_ref().map(|a| a.flush()) {
                    tracing::warn!("{}: audit flush failed: {}", name, flush);
                    journal.warn(&format!("Audit flush failed: {}", flush));
                    message = format!("{} (audit flush failed: {})", message, flush);
                }
                self.progress.send(ProgressEvent::CastFailed {
                    cast: name.clone(),
                    message,
                });
            }
        }
        result
    }

    fn run_stages(
        &self,
        cast: &mut Cast,
        tracker: &mut StageTracker<'_>,
        journal: &Journal,
    ) -> PipelineResult<CastReport> {
        let name = cast.base_name().to_string();
        let sequence = self.config.sequence();

        journal.phase("Preconditions");
        let latitude = self.check_preconditions(cast)?;

        let header = HexHeader::read(cast.raw_path()).map_err(|source| PipelineError::Header {
            cast: name.clone(),
            path: cast.raw_path().to_path_buf(),
            source,
        })?;
        tracing::info!(
            "{}: serial_number={} cast_date={}",
            name,
            header.serial_number,
            header.cast_date
        );
        self.progress.send(ProgressEvent::HexInfo {
            cast: name.clone(),
            serial_number: header.serial_number.clone(),
            cast_date: header.cast_date,
        });
        cast.set_header(header.clone());

        journal.phase("Configuration");
        let (config_folder, resolve_error) = match resolve_config_folder(
            &header.serial_number,
            header.cast_date,
            &self.config.config_root(),
        ) {
            Ok(folder) => {
                journal.info(&format!("Config folder {}", folder.path.display()));
                tracker.advance(CastStage::ConfigResolved)?;
                (Some(folder), None)
            }
            Err(e) => {
                tracing::warn!("{}: {}; using files already in processing dir", name, e);
                journal.warn(&e.to_string());
                tracker.advance(CastStage::ConfigMissing)?;
                (None, Some(e))
            }
        };

        journal.phase("Setup");
        let descriptor = setup_processing_dir(cast, config_folder.as_ref())
            .map_err(|e| PipelineError::setup(&name, tracker.stage, e))?;
        apply_latitude(cast.processing_dir(), sequence, latitude)
            .map_err(|e| PipelineError::setup(&name, tracker.stage, e))?;
        tracker.advance(CastStage::DirectorySetUp)?;

        let binding = TransformBinding {
            work_dir: cast.processing_dir().to_path_buf(),
            xmlcon: descriptor.clone(),
            sequence: sequence.clone(),
        };
        let mut transform =
            self.transforms
                .bind(&binding)
                .map_err(|source| PipelineError::Bind {
                    cast: name.clone(),
                    path: cast.processing_dir().to_path_buf(),
                    source,
                })?;

        let audit_info = |last_command: &str| StepAuditInfo {
            con_filename: file_name(&descriptor),
            latitude,
            last_command: last_command.to_string(),
        };
        let audit_each_step = self.config.settings().options.audit_each_step;
        let mut audit_errors: Vec<AuditError> = Vec::new();

        journal.phase("Conversion");
        tracker.advance(CastStage::Converting)?;
        let steps = StepPipeline::new(sequence).with_progress(self.progress.clone());
        let converted = steps
            .convert_raw(cast, transform.as_mut())
            .map_err(|e| PipelineError::step_failed(&name, e))?;
        journal.command(transform.last_command());
        if audit_each_step {
            self.audit_step(cast, &converted, &audit_info(transform.last_command()), &mut audit_errors);
        }

        journal.phase("Processing steps");
        tracker.advance(CastStage::Stepping)?;
        let final_output = steps
            .run(cast, transform.as_mut(), |cast, output, command| {
                journal.command(command);
                if audit_each_step {
                    self.audit_step(cast, output, &audit_info(command), &mut audit_errors);
                }
            })
            .map_err(|e| PipelineError::step_failed(&name, e))?;
        tracker.advance(CastStage::Completed)?;

        if let Some(audit) = &self.audit {
            if !audit_each_step {
                self.audit_step(cast, &final_output, &audit_info(transform.last_command()), &mut audit_errors);
            }
            if let Err(e) = audit.flush() {
                tracing::warn!("{}: audit flush failed: {}", name, e);
                audit_errors.push(e);
            }
        }

        Ok(CastReport {
            cast: name,
            final_output,
            descriptor,
            config_folder,
            resolve_error,
            audit_errors,
            stage: tracker.stage,
        })
    }

    /// Checks that must pass before anything is created. Returns the latitude.
    fn check_preconditions(&self, cast: &Cast) -> PipelineResult<f64> {
        let name = cast.base_name();

        let latitude = match cast.latitude() {
            Some(lat) if lat.is_finite() => lat,
            Some(lat) => {
                return Err(PipelineError::precondition(
                    name,
                    format!("latitude {} is not a finite number", lat),
                    None,
                ))
            }
            None => return Err(PipelineError::precondition(name, "latitude unknown", None)),
        };

        if cast.approved_dir().exists() {
            return Err(PipelineError::precondition(
                name,
                "cast is already approved",
                Some(cast.approved_dir()),
            ));
        }

        if !cast.raw_path().is_file() {
            return Err(PipelineError::precondition(
                name,
                "raw capture not found",
                Some(cast.raw_path()),
            ));
        }

        if !self.exist_ok && cast.processing_dir().exists() {
            return Err(PipelineError::precondition(
                name,
                "processing dir already exists",
                Some(cast.processing_dir()),
            ));
        }

        Ok(latitude)
    }

    fn audit_step(
        &self,
        cast: &Cast,
        output: &Path,
        info: &StepAuditInfo,
        errors: &mut Vec<AuditError>,
    ) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_step(cast, output, info) {
                tracing::warn!("{}: audit failed for {}: {}", cast.base_name(), output.display(), e);
                errors.push(e);
            }
        }
    }

    fn open_journal(&self, name: &str) -> Journal {
        let Some(dir) = &self.cast_logs else {
            return Journal(None);
        };
        match CastLogger::new(name, dir, LogConfig::default(), None) {
            Ok(logger) => Journal(Some(logger)),
            Err(e) => {
                tracing::warn!("Cannot open cast log for {} in {}: {}", name, dir.display(), e);
                Journal(None)
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
