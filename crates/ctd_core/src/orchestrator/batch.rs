//! Batch processing of many casts on worker threads.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;

use crate::cast::Cast;
use crate::latitude::LatitudeService;

use super::cast_pipeline::{CastPipeline, CastReport};
use super::errors::PipelineError;

/// Result of processing one cast in a batch.
#[derive(Debug)]
pub struct CastOutcome {
    pub cast: String,
    pub result: Result<CastReport, PipelineError>,
}

impl CastOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs a `CastPipeline` over a list of casts.
///
/// Workers pull casts from a shared queue; each cast is handled by exactly
/// one worker, and one cast's failure never affects another.
pub struct BatchProcessor {
    pipeline: Arc<CastPipeline>,
    latitude: Option<Arc<dyn LatitudeService>>,
    workers: usize,
}

impl BatchProcessor {
    pub fn new(pipeline: Arc<CastPipeline>) -> Self {
        let workers = pipeline.config().settings().options.workers.max(1);
        Self {
            pipeline,
            latitude: None,
            workers,
        }
    }

    /// Look up latitude for casts that have none.
    pub fn with_latitude(mut self, service: Arc<dyn LatitudeService>) -> Self {
        self.latitude = Some(service);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Process every cast and return one outcome per cast, in input order.
    ///
    /// A base name given more than once is processed once; the repeats fail
    /// with a precondition error so two workers never share a processing dir.
    pub fn process(&self, casts: Vec<Cast>) -> Vec<CastOutcome> {
        let total = casts.len();
        if total == 0 {
            return Vec::new();
        }

        let (done_tx, done_rx) = unbounded::<(usize, CastOutcome)>();
        let (job_tx, job_rx) = unbounded::<(usize, Cast)>();
        let mut seen = HashSet::with_capacity(total);
        let mut queued = 0;
        for (i, mut cast) in casts.into_iter().enumerate() {
            if !seen.insert(cast.base_name().to_string()) {
                tracing::warn!("{} listed more than once, skipping repeat", cast.base_name());
                let outcome = CastOutcome {
                    cast: cast.base_name().to_string(),
                    result: Err(PipelineError::precondition(
                        cast.base_name(),
                        "Cast is already queued in this batch",
                        Some(cast.raw_path()),
                    )),
                };
                let _ = done_tx.send((i, outcome));
                continue;
            }
            self.attach_latitude(&mut cast);
            let _ = job_tx.send((i, cast));
            queued += 1;
        }
        drop(job_tx);

        let workers = self.workers.min(queued);
        tracing::info!("Processing {} casts on {} workers", queued, workers);

        thread::scope(|scope| {
            for worker in 0..workers {
                let jobs = job_rx.clone();
                let done = done_tx.clone();
                let pipeline = &self.pipeline;
                scope.spawn(move || {
                    for (i, mut cast) in jobs.iter() {
                        tracing::debug!("worker {} took {}", worker, cast.base_name());
                        let result = pipeline.process_cast(&mut cast);
                        let outcome = CastOutcome {
                            cast: cast.base_name().to_string(),
                            result,
                        };
                        let _ = done.send((i, outcome));
                    }
                });
            }
        });
        drop(done_tx);

        let mut outcomes: Vec<(usize, CastOutcome)> = done_rx.iter().collect();
        outcomes.sort_by_key(|(i, _)| *i);

        let failed = outcomes.iter().filter(|(_, o)| !o.is_success()).count();
        if failed > 0 {
            tracing::warn!("{} of {} casts failed", failed, total);
        } else {
            tracing::info!("All {} casts processed", total);
        }

        outcomes.into_iter().map(|(_, o)| o).collect()
    }

    /// Lookup failures leave the latitude unset; the cast then fails its
    /// precondition check.
    fn attach_latitude(&self, cast: &mut Cast) {
        if cast.latitude().is_some() {
            return;
        }
        let Some(service) = &self.latitude else {
            return;
        };
        match service.lookup(cast.base_name()) {
            Ok(lat) => cast.set_latitude(Some(lat)),
            Err(e) => tracing::warn!("No latitude for {}: {}", cast.base_name(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::CastRoots;
    use crate::config::{ConfigSnapshot, Settings};
    use crate::latitude::ManualLatitude;
    use crate::pipeline::StepFunction;
    use crate::sbe::{TransformBinding, TransformFactory, TransformResult, TransformService};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const PSA: &str = "<Settings><Latitude value=\"0\"/></Settings>";

    struct Echo;

    impl TransformService for Echo {
        fn invoke(&mut self, function: StepFunction, input: &str) -> TransformResult<String> {
            Ok(format!("{}{}\n", input, function))
        }

        fn last_command(&self) -> &str {
            ""
        }
    }

    struct EchoFactory;

    impl TransformFactory for EchoFactory {
        fn bind(&self, _binding: &TransformBinding) -> TransformResult<Box<dyn TransformService>> {
            Ok(Box::new(Echo))
        }
    }

    fn write_cast(roots: &CastRoots, name: &str, serial: &str) {
        fs::write(
            roots.raw.join(format!("{}.hex", name)),
            format!(
                "* Temperature SN = {}\n* cast   1 01 Dec 2021 09:52:33 samples\n*END*\n00\n",
                serial
            ),
        )
        .unwrap();
    }

    fn config(root: &Path) -> Arc<ConfigSnapshot> {
        let mut settings = Settings::default();
        settings.paths.raw = root.join("raw").display().to_string();
        settings.paths.processing = root.join("processing").display().to_string();
        settings.paths.approved = root.join("approved").display().to_string();
        settings.paths.ctd_config = root.join("ctd_config").display().to_string();
        settings.options.workers = 3;
        Arc::new(ConfigSnapshot::new(settings).unwrap())
    }

    #[test]
    fn failures_are_isolated_and_order_is_kept() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let roots = config.roots();
        fs::create_dir_all(&roots.raw).unwrap();
        fs::create_dir_all(&roots.processing).unwrap();

        let folder = dir.path().join("ctd_config/7093/SBE19_20200101");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("SBE19.xmlcon"), "<cfg/>").unwrap();
        for step in config.sequence().steps() {
            fs::write(folder.join(&step.psa_file), PSA).unwrap();
        }

        for name in ["a1", "a2", "a3", "a4"] {
            write_cast(&roots, name, "7093");
        }

        let mut latitudes = ManualLatitude::new();
        latitudes.insert("a1", 60.0);
        latitudes.insert("a2", 61.0);
        latitudes.insert("a4", 62.0);

        let pipeline = Arc::new(CastPipeline::new(config.clone(), Arc::new(EchoFactory)));
        let batch = BatchProcessor::new(pipeline).with_latitude(Arc::new(latitudes));

        let casts: Vec<Cast> = ["a1", "a2", "a3", "a4"]
            .iter()
            .map(|n| Cast::new(*n, &roots))
            .collect();
        let outcomes = batch.process(casts);

        let names: Vec<&str> = outcomes.iter().map(|o| o.cast.as_str()).collect();
        assert_eq!(names, vec!["a1", "a2", "a3", "a4"]);
        assert!(outcomes[0].is_success());
        assert!(outcomes[1].is_success());
        assert!(outcomes[3].is_success());

        let err = outcomes[2].result.as_ref().unwrap_err();
        assert!(err.is_precondition());
        assert!(!roots.processing.join("a3").exists());
        assert!(roots.processing.join("a4").join("a4_CTFALDB.cnv").is_file());
    }

    #[test]
    fn repeated_cast_runs_once() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let roots = config.roots();
        fs::create_dir_all(&roots.raw).unwrap();
        fs::create_dir_all(&roots.processing).unwrap();

        let folder = dir.path().join("ctd_config/7093/SBE19_20200101");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("SBE19.xmlcon"), "<cfg/>").unwrap();
        for step in config.sequence().steps() {
            fs::write(folder.join(&step.psa_file), PSA).unwrap();
        }
        write_cast(&roots, "a1", "7093");

        let pipeline = Arc::new(CastPipeline::new(config.clone(), Arc::new(EchoFactory)));
        let batch = BatchProcessor::new(pipeline).with_workers(2);

        let casts: Vec<Cast> = crate::cast::casts_by_name(&["a1", "a1.hex"], &roots)
            .into_iter()
            .map(|c| c.with_latitude(60.0))
            .collect();
        let outcomes = batch.process(casts);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_success());
        let err = outcomes[1].result.as_ref().unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(err.cast(), "a1");
        assert!(roots.processing.join("a1").join("a1_CTFALDB.cnv").is_file());
    }

    #[test]
    fn empty_batch_is_empty() {
        let dir = tempdir().unwrap();
        let pipeline = Arc::new(CastPipeline::new(config(dir.path()), Arc::new(EchoFactory)));
        assert!(BatchProcessor::new(pipeline).process(Vec::new()).is_empty());
    }
}
