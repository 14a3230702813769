//! Step runner.
//!
//! Runs the conversion step on the raw capture and then the chained steps,
//! each reading the previous `.cnv` and writing the next one. A failure
//! stops the chain; outputs already written stay in place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::chain::StepChain;
use super::errors::{StepError, StepResult};
use super::sequence::{ProcessingSequence, StepFunction};
use crate::cast::Cast;
use crate::progress::{ProgressEvent, ProgressSender};
use crate::sbe::TransformService;

/// Position of the conversion step in the sequence.
const CONVERSION_INDEX: usize = 1;

/// Executes a validated processing sequence for one cast.
pub struct StepPipeline<'a> {
    sequence: &'a ProcessingSequence,
    progress: ProgressSender,
}

impl<'a> StepPipeline<'a> {
    pub fn new(sequence: &'a ProcessingSequence) -> Self {
        Self {
            sequence,
            progress: ProgressSender::disabled(),
        }
    }

    /// Report step progress through this sender.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// Run the conversion step: raw capture in, `<base>_C.cnv` out.
    pub fn convert_raw(
        &self,
        cast: &Cast,
        transform: &mut dyn TransformService,
    ) -> StepResult<PathBuf> {
        let step = StepFunction::DatCnv;
        self.emit_step(cast, step, CONVERSION_INDEX);

        let input = read_lossy(step, CONVERSION_INDEX, cast.raw_path())?;
        tracing::info!("Processing file: {}", cast.raw_path().display());

        let converted = transform
            .invoke(step, &input)
            .map_err(|e| StepError::transform(step, CONVERSION_INDEX, e))?;

        let dest = StepChain::converted().path_in(cast.processing_dir(), cast.base_name());
        write_output(step, CONVERSION_INDEX, &dest, &converted)?;
        tracing::info!("HEX file converted: {}", dest.display());
        Ok(dest)
    }

    /// Run every step after the conversion and return the final output.
    ///
    /// `on_step` is called after each successful step with the cast, the new
    /// output and the tool's last command.
    pub fn run<F>(
        &self,
        cast: &Cast,
        transform: &mut dyn TransformService,
        mut on_step: F,
    ) -> StepResult<PathBuf>
    where
        F: FnMut(&Cast, &Path, &str),
    {
        let dir = cast.processing_dir();
        let base = cast.base_name();

        let mut chain = StepChain::converted();
        let mut current = chain.path_in(dir, base);

        for (index, step) in self.sequence.chained_steps() {
            self.emit_step(cast, step.function, index);

            let input = read_lossy(step.function, index, &current)?;
            let output = transform
                .invoke(step.function, &input)
                .map_err(|e| StepError::transform(step.function, index, e))?;

            let next = chain.with(step.append_code);
            let dest = next.path_in(dir, base);
            write_output(step.function, index, &dest, &output)?;
            tracing::info!("CNV file operation successful: {} {}", step.function, file_name(&dest));

            on_step(cast, &dest, transform.last_command());

            chain = next;
            current = dest;
        }

        Ok(current)
    }

    fn emit_step(&self, cast: &Cast, step: StepFunction, index: usize) {
        self.progress.send(ProgressEvent::ProcessStep {
            cast: cast.base_name().to_string(),
            step,
            index,
            total: self.sequence.len(),
        });
    }
}

fn read_lossy(step: StepFunction, index: usize, path: &Path) -> StepResult<String> {
    let bytes = fs::read(path).map_err(|source| StepError::Read {
        step,
        index,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a step output, flagging a destination left behind by a failed write.
fn write_output(step: StepFunction, index: usize, dest: &Path, content: &str) -> StepResult<()> {
    let result = fs::File::create(dest).and_then(|mut file| {
        file.write_all(content.as_bytes())?;
        file.flush()
    });

    result.map_err(|source| {
        let partial = dest.exists();
        tracing::error!("Error while performing operation: {}", step);
        if partial {
            tracing::warn!("file could be corrupted: {}", dest.display());
        }
        StepError::Write {
            step,
            index,
            path: dest.to_path_buf(),
            partial,
            source,
        }
    })
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
    use crate::pipeline::StepEntry;
    use crate::progress::progress_channel;
    use crate::sbe::{TransformError, TransformResult};
    use tempfile::{tempdir, TempDir};

    /// Appends the step name to its input; fails on a chosen function.
    struct RecordingTransform {
        calls: Vec<StepFunction>,
        fail_on: Option<StepFunction>,
        last: String,
    }

    impl RecordingTransform {
        fn new(fail_on: Option<StepFunction>) -> Self {
            Self {
                calls: Vec::new(),
                fail_on,
                last: String::new(),
            }
        }
    }

    impl TransformService for RecordingTransform {
        fn invoke(&mut self, function: StepFunction, input: &str) -> TransformResult<String> {
            self.calls.push(function);
            self.last = function.as_str().to_string();
            if self.fail_on == Some(function) {
                return Err(TransformError::command_failed(function.as_str(), 1, "boom"));
            }
            Ok(format!("{}|{}", input, function))
        }

        fn last_command(&self) -> &str {
            &self.last
        }
    }

    fn staged_cast() -> (TempDir, Cast) {
        let dir = tempdir().unwrap();
        let roots = CastRoots::new(dir.path(), dir.path().join("proc"), dir.path().join("appr"));
        let cast = Cast::new("c1", &roots);
        fs::write(cast.raw_path(), "*END*\nHEX").unwrap();
        fs::create_dir_all(cast.processing_dir()).unwrap();
        (dir, cast)
    }

    fn five_steps() -> ProcessingSequence {
        ProcessingSequence::from_entries(&[
            StepEntry::new("dat_cnv", "DatCnv.psa", "C"),
            StepEntry::new("filter", "Filter.psa", "F"),
            StepEntry::new("align_ctd", "AlignCTD.psa", "A"),
            StepEntry::new("loop_edit", "LoopEdit.psa", "L"),
            StepEntry::new("derive", "Derive.psa", "D"),
        ])
        .unwrap()
    }

    #[test]
    fn chain_names_every_output() {
        let (_dir, cast) = staged_cast();
        let seq = five_steps();
        let pipeline = StepPipeline::new(&seq);
        let mut transform = RecordingTransform::new(None);

        let converted = pipeline.convert_raw(&cast, &mut transform).unwrap();
        assert!(converted.ends_with("c1_C.cnv"));

        let mut logged = Vec::new();
        let last = pipeline
            .run(&cast, &mut transform, |_, path, cmd| {
                logged.push((file_name(path), cmd.to_string()))
            })
            .unwrap();

        assert!(last.ends_with("c1_CFALD.cnv"));
        assert_eq!(
            fs::read_to_string(&last).unwrap(),
            "*END*\nHEX|dat_cnv|filter|align_ctd|loop_edit|derive"
        );
        let names: Vec<_> = logged.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["c1_CF.cnv", "c1_CFA.cnv", "c1_CFAL.cnv", "c1_CFALD.cnv"]);
        assert_eq!(logged[0].1, "filter");
        assert_eq!(logged[3].1, "derive");
    }

    #[test]
    fn failure_at_step_three_keeps_earlier_outputs() {
        let (_dir, cast) = staged_cast();
        let seq = five_steps();
        let pipeline = StepPipeline::new(&seq);
        let mut transform = RecordingTransform::new(Some(StepFunction::AlignCtd));

        pipeline.convert_raw(&cast, &mut transform).unwrap();
        let err = pipeline.run(&cast, &mut transform, |_, _, _| {}).unwrap_err();

        assert_eq!(err.index(), 3);
        assert_eq!(err.step(), StepFunction::AlignCtd);
        let dir = cast.processing_dir();
        assert!(dir.join("c1_C.cnv").is_file());
        assert!(dir.join("c1_CF.cnv").is_file());
        assert!(!dir.join("c1_CFA.cnv").exists());
        assert!(!transform.calls.contains(&StepFunction::LoopEdit));
        assert!(!transform.calls.contains(&StepFunction::Derive));
    }

    #[test]
    fn conversion_only_sequence_returns_converted_file() {
        let (_dir, cast) = staged_cast();
        let seq =
            ProcessingSequence::from_entries(&[StepEntry::new("dat_cnv", "DatCnv.psa", "C")])
                .unwrap();
        let pipeline = StepPipeline::new(&seq);
        let mut transform = RecordingTransform::new(None);

        pipeline.convert_raw(&cast, &mut transform).unwrap();
        let last = pipeline.run(&cast, &mut transform, |_, _, _| {}).unwrap();
        assert!(last.ends_with("c1_C.cnv"));
    }

    #[test]
    fn missing_input_names_the_step() {
        let (_dir, cast) = staged_cast();
        let seq = five_steps();
        let pipeline = StepPipeline::new(&seq);
        let mut transform = RecordingTransform::new(None);

        let err = pipeline.run(&cast, &mut transform, |_, _, _| {}).unwrap_err();
        assert!(matches!(err, StepError::Read { index: 2, .. }));
        assert!(err.path().unwrap().ends_with("c1_C.cnv"));
    }

    #[test]
    fn progress_uses_positions_in_full_sequence() {
        let (_dir, cast) = staged_cast();
        let seq = five_steps();
        let (sender, rx) = progress_channel(16);
        let pipeline = StepPipeline::new(&seq).with_progress(sender);
        let mut transform = RecordingTransform::new(None);

        pipeline.convert_raw(&cast, &mut transform).unwrap();
        pipeline.run(&cast, &mut transform, |_, _, _| {}).unwrap();

        let steps: Vec<(usize, usize)> = rx
            .try_iter()
            .filter_map(|ev| match ev {
                ProgressEvent::ProcessStep { index, total, .. } => Some((index, total)),
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }
}
