//! Subcommand handlers.

use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use ctd_core::approval::{self, AuditStatus};
use ctd_core::audit::{AuditLog, AuditSink};
use ctd_core::cast::{casts_by_name, discover_casts, Cast, CastLocation};
use ctd_core::config::{ConfigSnapshot, LatitudeMethod};
use ctd_core::latitude::{ConstantLatitude, LatitudeService, SpreadsheetLatitude};
use ctd_core::orchestrator::{BatchProcessor, CastPipeline};
use ctd_core::progress::{progress_channel, ProgressEvent};
use ctd_core::resolver::resolve_config_folder;
use ctd_core::sbe::SbeFactory;

use crate::prompt::PromptLatitude;

/// Progress events buffered before the printer falls behind and drops.
const PROGRESS_CAPACITY: usize = 256;

pub struct ProcessArgs {
    pub casts: Vec<String>,
    pub all: bool,
    pub latitude: Option<f64>,
    pub workers: Option<usize>,
    pub json: bool,
}

pub fn process(snapshot: Arc<ConfigSnapshot>, args: ProcessArgs) -> Result<()> {
    let roots = snapshot.roots();
    let casts = if args.all {
        discover_casts(&roots)
            .with_context(|| format!("Failed to list {}", roots.raw.display()))?
    } else if args.casts.is_empty() {
        bail!("Name at least one cast or pass --all");
    } else {
        casts_by_name(&args.casts, &roots)
    };
    if casts.is_empty() {
        println!("No casts to process in {}", roots.raw.display());
        return Ok(());
    }

    let latitude = latitude_service(&snapshot, args.latitude)?;
    let audit = open_audit(&snapshot)?;

    let (progress, events) = progress_channel(PROGRESS_CAPACITY);
    let json = args.json;
    let printer = thread::spawn(move || {
        for event in events.iter() {
            print_event(&event, json);
        }
    });

    let mut pipeline = CastPipeline::new(
        snapshot.clone(),
        Arc::new(SbeFactory::new(snapshot.sbe_bin())),
    )
    .with_progress(progress);
    if let Some(audit) = audit {
        pipeline = pipeline.with_audit(audit);
    }
    if snapshot.settings().logging.cast_logs {
        pipeline = pipeline.with_cast_logs(snapshot.logs_dir());
    }

    let mut batch = BatchProcessor::new(Arc::new(pipeline)).with_latitude(latitude);
    if let Some(workers) = args.workers {
        batch = batch.with_workers(workers);
    }

    let outcomes = batch.process(casts);
    drop(batch);
    let _ = printer.join();

    let total = outcomes.len();
    let mut failed = 0;
    println!("\n--- Processing Summary ---");
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => {
                println!("  {}: {}", outcome.cast, report.final_output.display());
                if let Some(e) = &report.resolve_error {
                    println!("    config: {}", e);
                }
                for e in &report.audit_errors {
                    println!("    audit: {}", e);
                }
            }
            Err(e) => {
                failed += 1;
                let path = e.path().map(|p| format!(" [{}]", p.display())).unwrap_or_default();
                tracing::error!(cast = %outcome.cast, stage = %e.stage(), "{}{}", e, path);
                println!("  {}: FAILED at {}: {}{}", outcome.cast, e.stage(), e, path);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} casts failed", failed, total);
    }
    println!("{} casts processed", total);
    Ok(())
}

pub fn approve(snapshot: &ConfigSnapshot, base_name: &str, comment: &str) -> Result<()> {
    let cast = Cast::new(base_name, &snapshot.roots());
    let audit = open_audit(snapshot)?;
    let sink = audit.as_deref().map(|a| a as &dyn AuditSink);

    let outcome = approval::approve(&cast, comment, sink)
        .with_context(|| format!("Failed to approve {}", base_name))?;

    println!("Approved {} -> {}", base_name, outcome.approved_dir.display());
    for path in &outcome.unsorted {
        println!("  left unsorted: {}", path.display());
    }
    match &outcome.audit {
        AuditStatus::NotConfigured => {}
        AuditStatus::Logged(path) => println!("  audit: recorded {}", path.display()),
        AuditStatus::NoDeliverable => println!("  audit: no .cnv in done/ to record"),
        AuditStatus::Failed(e) => println!("  audit FAILED: {}", e),
    }
    Ok(())
}

pub fn status(snapshot: &ConfigSnapshot, names: &[String], json: bool) -> Result<()> {
    let roots = snapshot.roots();
    let casts = if names.is_empty() {
        discover_casts(&roots).with_context(|| format!("Failed to list {}", roots.raw.display()))?
    } else {
        casts_by_name(names, &roots)
    };

    for cast in &casts {
        let location = cast.location();
        let outputs = match location {
            CastLocation::Approved => cast.approved_outputs(),
            _ => cast.processing_outputs(),
        }
        .unwrap_or_default();
        let latest = approval::select_final_deliverable(&outputs)
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());

        if json {
            let line = serde_json::json!({
                "cast": cast.base_name(),
                "location": location,
                "outputs": outputs.len(),
                "latest": latest,
            });
            println!("{}", line);
        } else {
            println!(
                "{:<24} {:<12} {}",
                cast.base_name(),
                location.as_str(),
                latest.unwrap_or_default()
            );
        }
    }
    Ok(())
}

pub fn resolve(snapshot: &ConfigSnapshot, serial_number: &str, date: &str) -> Result<()> {
    let cast_date = parse_cast_date(date)?;
    let folder = resolve_config_folder(serial_number, cast_date, &snapshot.config_root())?;
    let descriptor = folder
        .descriptor()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|e| format!("({})", e));

    println!("{}", folder.path.display());
    println!("  valid from: {}", folder.valid_from);
    println!("  xmlcon:     {}", descriptor);
    Ok(())
}

pub fn show_config(snapshot: &ConfigSnapshot) -> Result<()> {
    if let Some(path) = snapshot.source() {
        println!("# {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(snapshot.settings())?);
    Ok(())
}

fn latitude_service(
    snapshot: &ConfigSnapshot,
    fixed: Option<f64>,
) -> Result<Arc<dyn LatitudeService>> {
    if let Some(lat) = fixed {
        return Ok(Arc::new(ConstantLatitude(lat)));
    }

    let options = &snapshot.settings().options;
    let service: Arc<dyn LatitudeService> = match options.latitude_method {
        LatitudeMethod::Constant => {
            let lat = options
                .constant_latitude
                .context("constant_latitude is not set")?;
            Arc::new(ConstantLatitude(lat))
        }
        LatitudeMethod::Spreadsheet => {
            let path = snapshot
                .latitude_spreadsheet()
                .context("latitude_spreadsheet_file is not set")?;
            Arc::new(SpreadsheetLatitude::open(path)?)
        }
        LatitudeMethod::Ask => Arc::new(PromptLatitude::default()),
    };
    Ok(service)
}

fn open_audit(snapshot: &ConfigSnapshot) -> Result<Option<Arc<AuditLog>>> {
    let Some(path) = snapshot.audit_log_path() else {
        return Ok(None);
    };
    let log = AuditLog::open(&path, snapshot.settings().audit_log.update_rows)
        .with_context(|| format!("Failed to open audit log {}", path.display()))?;
    Ok(Some(Arc::new(log)))
}

fn parse_cast_date(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", text))?;
    date.and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date '{}'", text))
}

fn print_event(event: &ProgressEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{}", line);
        }
        return;
    }
    match event {
        ProgressEvent::CastStarted { cast } => println!("{}: started", cast),
        ProgressEvent::HexInfo {
            cast,
            serial_number,
            cast_date,
        } => println!("{}: SN {} cast {}", cast, serial_number, cast_date),
        ProgressEvent::ProcessStep {
            cast,
            step,
            index,
            total,
        } => println!("{}: [{}/{}] {}", cast, index, total, step),
        ProgressEvent::CastCompleted { cast, output } => println!("{}: done -> {}", cast, output),
        ProgressEvent::CastFailed { cast, message } => println!("{}: FAILED {}", cast, message),
    }
}
