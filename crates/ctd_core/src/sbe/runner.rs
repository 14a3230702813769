//! SBE Data Processing command wrapper.
//!
//! Each step is a separate batch-mode program (`FilterW`, `DeriveW`, ...).
//! Input is written to a scratch directory inside the processing dir, the
//! program writes its output there, and the scratch dir is removed when the
//! call returns.

use std::env::consts::EXE_SUFFIX;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{
    TransformBinding, TransformError, TransformFactory, TransformResult, TransformService,
};
use crate::pipeline::{ProcessingSequence, StepFunction};

const OUTPUT_NAME: &str = "output.cnv";

/// Batch program implementing a step function.
pub fn program_name(function: StepFunction) -> &'static str {
    match function {
        StepFunction::DatCnv => "DatCnvW",
        StepFunction::Filter => "FilterW",
        StepFunction::AlignCtd => "AlignCTDW",
        StepFunction::CellThermalMass => "CellTMW",
        StepFunction::LoopEdit => "LoopEditW",
        StepFunction::WildEdit => "WildEditW",
        StepFunction::Derive => "DeriveW",
        StepFunction::BinAvg => "BinAvgW",
        StepFunction::DeriveTeos10 => "DeriveTEOS_10W",
    }
}

/// SBE Data Processing bound to one processing directory.
#[derive(Debug)]
pub struct SbeDataProcessing {
    bin_dir: PathBuf,
    work_dir: PathBuf,
    xmlcon: PathBuf,
    sequence: ProcessingSequence,
    last_command: String,
}

impl SbeDataProcessing {
    pub fn new(bin_dir: impl Into<PathBuf>, binding: &TransformBinding) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            work_dir: binding.work_dir.clone(),
            xmlcon: binding.xmlcon.clone(),
            sequence: binding.sequence.clone(),
            last_command: String::new(),
        }
    }

    fn executable(&self, program: &str) -> PathBuf {
        self.bin_dir.join(format!("{}{}", program, EXE_SUFFIX))
    }
}

impl TransformService for SbeDataProcessing {
    fn invoke(&mut self, function: StepFunction, input: &str) -> TransformResult<String> {
        let step = self
            .sequence
            .descriptor(function)
            .ok_or(TransformError::UnsupportedStep(function))?;

        let program = program_name(function);
        let exe = self.executable(program);
        if !exe.is_file() {
            return Err(TransformError::ToolNotFound(exe));
        }

        let scratch = tempfile::Builder::new()
            .prefix(".sbe-")
            .tempdir_in(&self.work_dir)
            .map_err(|e| TransformError::io("create scratch dir", e))?;

        let input_name = if function.is_conversion() {
            "input.hex"
        } else {
            "input.cnv"
        };
        let input_path = scratch.path().join(input_name);
        fs::write(&input_path, input).map_err(|e| TransformError::io("write step input", e))?;

        let psa = self.work_dir.join(&step.psa_file);
        let args = [
            format!("/i{}", input_path.display()),
            format!("/c{}", self.xmlcon.display()),
            format!("/p{}", psa.display()),
            format!("/o{}", scratch.path().display()),
            format!("/f{}", OUTPUT_NAME),
            "/s".to_string(),
        ];

        self.last_command = command_line(&exe, &args);
        tracing::debug!("Running: {}", self.last_command);

        let output = Command::new(&exe)
            .args(&args)
            .current_dir(&self.work_dir)
            .output()
            .map_err(|source| TransformError::Spawn {
                tool: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransformError::command_failed(
                program,
                output.status.code().unwrap_or(-1),
                stderr.trim(),
            ));
        }

        let output_path = scratch.path().join(OUTPUT_NAME);
        if !output_path.is_file() {
            return Err(TransformError::MissingOutput {
                tool: program.to_string(),
                path: output_path,
            });
        }

        let bytes = fs::read(&output_path).map_err(|e| TransformError::io("read step output", e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn last_command(&self) -> &str {
        &self.last_command
    }
}

/// Render a command line the way it would be typed, quoting paths.
fn command_line(exe: &Path, args: &[String]) -> String {
    let mut line = format!("\"{}\"", exe.display());
    for arg in args {
        line.push(' ');
        match arg.get(..2) {
            Some(flag) if arg.len() > 2 => {
                line.push_str(flag);
                line.push('"');
                line.push_str(&arg[2..]);
                line.push('"');
            }
            _ => line.push_str(arg),
        }
    }
    line
}

/// Creates `SbeDataProcessing` services from a bin directory.
#[derive(Debug, Clone)]
pub struct SbeFactory {
    bin_dir: PathBuf,
}

impl SbeFactory {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
        }
    }
}

impl TransformFactory for SbeFactory {
    fn bind(&self, binding: &TransformBinding) -> TransformResult<Box<dyn TransformService>> {
        if !self.bin_dir.is_dir() {
            return Err(TransformError::ToolNotFound(self.bin_dir.clone()));
        }
        Ok(Box::new(SbeDataProcessing::new(&self.bin_dir, binding)))
    }
}
