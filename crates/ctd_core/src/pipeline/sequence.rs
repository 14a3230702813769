//! Processing sequence: the ordered, validated list of step descriptors.
//!
//! The sequence comes from configuration as loosely typed entries
//! (`StepEntry`) and is validated once into a `ProcessingSequence`.
//! Only a validated sequence can be handed to the step runner.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::chain::CONVERSION_CODE;

/// Step functions accepted in a processing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFunction {
    DatCnv,
    Filter,
    AlignCtd,
    CellThermalMass,
    LoopEdit,
    WildEdit,
    Derive,
    BinAvg,
    #[serde(rename = "derive_teos10")]
    DeriveTeos10,
}

impl StepFunction {
    /// Every allowed step function, in no particular order.
    pub const ALL: [StepFunction; 9] = [
        StepFunction::DatCnv,
        StepFunction::Filter,
        StepFunction::AlignCtd,
        StepFunction::CellThermalMass,
        StepFunction::LoopEdit,
        StepFunction::WildEdit,
        StepFunction::Derive,
        StepFunction::BinAvg,
        StepFunction::DeriveTeos10,
    ];

    /// Configuration name of the function.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepFunction::DatCnv => "dat_cnv",
            StepFunction::Filter => "filter",
            StepFunction::AlignCtd => "align_ctd",
            StepFunction::CellThermalMass => "cell_thermal_mass",
            StepFunction::LoopEdit => "loop_edit",
            StepFunction::WildEdit => "wild_edit",
            StepFunction::Derive => "derive",
            StepFunction::BinAvg => "bin_avg",
            StepFunction::DeriveTeos10 => "derive_teos10",
        }
    }

    /// Whether this is the conversion step that reads the raw capture.
    pub fn is_conversion(&self) -> bool {
        matches!(self, StepFunction::DatCnv)
    }
}

impl fmt::Display for StepFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepFunction {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepFunction::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| SequenceError::UnknownFunction(s.to_string()))
    }
}

/// Raw sequence entry as written in `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
    pub function: String,
    pub psa_file: String,
    pub append: String,
}

impl StepEntry {
    pub fn new(
        function: impl Into<String>,
        psa_file: impl Into<String>,
        append: impl Into<String>,
    ) -> Self {
        Self {
            function: function.into(),
            psa_file: psa_file.into(),
            append: append.into(),
        }
    }
}

/// Default sequence used when the configuration does not name one.
pub fn default_step_entries() -> Vec<StepEntry> {
    vec![
        StepEntry::new("dat_cnv", "DatCnv.psa", "C"),
        StepEntry::new("cell_thermal_mass", "CellTM.psa", "T"),
        StepEntry::new("filter", "Filter.psa", "F"),
        StepEntry::new("align_ctd", "AlignCTD.psa", "A"),
        StepEntry::new("loop_edit", "LoopEdit.psa", "L"),
        StepEntry::new("derive", "Derive.psa", "D"),
        StepEntry::new("bin_avg", "BinAvg.psa", "B"),
    ]
}

/// Errors raised while validating a processing sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("Invalid function name: {0}")]
    UnknownFunction(String),

    #[error("Step '{function}' append code must be a single alphanumeric character, got '{append}'")]
    InvalidAppendCode { function: String, append: String },

    #[error("Append code '{code}' is used by more than one step")]
    DuplicateAppendCode { code: char },

    #[error("dat_cnv append code must be '{}', got '{append}'", CONVERSION_CODE)]
    ConversionCode { append: char },

    #[error("Step '{function}' has an empty psa_file")]
    MissingProfile { function: String },

    #[error("dat_cnv must be the first step, found at position {position}")]
    ConversionNotFirst { position: usize },

    #[error("Processing sequence is empty")]
    Empty,
}

/// One validated step of the processing sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    pub function: StepFunction,
    pub psa_file: String,
    pub append_code: char,
}

/// Validated processing sequence, shared read-only across casts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingSequence {
    steps: Vec<StepDescriptor>,
}

impl ProcessingSequence {
    /// Validate configuration entries against the allow-list.
    ///
    /// Checks function names and profile files, that `dat_cnv` (when present)
    /// comes first and appends `C`, and that no two steps share an append
    /// code. The conversion code is reserved even when `dat_cnv` is omitted,
    /// since the chain always starts from it.
    pub fn from_entries(entries: &[StepEntry]) -> Result<Self, SequenceError> {
        if entries.is_empty() {
            return Err(SequenceError::Empty);
        }

        let mut steps: Vec<StepDescriptor> = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let function: StepFunction = entry.function.trim().parse()?;

            let mut chars = entry.append.chars();
            let append_code = match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => c,
                _ => {
                    return Err(SequenceError::InvalidAppendCode {
                        function: entry.function.clone(),
                        append: entry.append.clone(),
                    })
                }
            };

            if entry.psa_file.trim().is_empty() {
                return Err(SequenceError::MissingProfile {
                    function: entry.function.clone(),
                });
            }

            if function.is_conversion() && i != 0 {
                return Err(SequenceError::ConversionNotFirst { position: i + 1 });
            }

            if function.is_conversion() {
                if append_code != CONVERSION_CODE {
                    return Err(SequenceError::ConversionCode {
                        append: append_code,
                    });
                }
            } else if append_code == CONVERSION_CODE
                || steps.iter().any(|s| s.append_code == append_code)
            {
                return Err(SequenceError::DuplicateAppendCode { code: append_code });
            }

            steps.push(StepDescriptor {
                function,
                psa_file: entry.psa_file.trim().to_string(),
                append_code,
            });
        }

        Ok(Self { steps })
    }

    /// All steps in configured order, `dat_cnv` included.
    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    /// Total step count, used as the denominator for progress events.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The conversion step, if configured.
    pub fn conversion(&self) -> Option<&StepDescriptor> {
        self.steps.first().filter(|s| s.function.is_conversion())
    }

    /// Steps executed by the chaining loop, paired with their 1-based
    /// position in the full sequence.
    pub fn chained_steps(&self) -> impl Iterator<Item = (usize, &StepDescriptor)> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.function.is_conversion())
            .map(|(i, s)| (i + 1, s))
    }

    /// Descriptor for a given function.
    pub fn descriptor(&self, function: StepFunction) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.function == function)
    }

    /// Profile file names referenced by the sequence, in order.
    pub fn profile_files(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.psa_file.as_str())
    }
}

impl Default for ProcessingSequence {
    fn default() -> Self {
        // The built-in entries are known to be valid.
        let steps = default_step_entries()
            .iter()
            .filter_map(|e| {
                Some(StepDescriptor {
                    function: e.function.parse().ok()?,
                    psa_file: e.psa_file.clone(),
                    append_code: e.append.chars().next()?,
                })
            })
            .collect();
        Self { steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_entries_validate() {
        let seq = ProcessingSequence::from_entries(&default_step_entries()).unwrap();
        assert_eq!(seq.len(), 7);
        assert_eq!(seq, ProcessingSequence::default());
        assert_eq!(seq.conversion().unwrap().append_code, 'C');
    }

    #[test]
    fn unknown_function_is_rejected() {
        let entries = vec![
            StepEntry::new("dat_cnv", "DatCnv.psa", "C"),
            StepEntry::new("sea_plot", "SeaPlot.psa", "P"),
        ];
        let err = ProcessingSequence::from_entries(&entries).unwrap_err();
        assert_eq!(err, SequenceError::UnknownFunction("sea_plot".to_string()));
        assert_eq!(err.to_string(), "Invalid function name: sea_plot");
    }

    #[test]
    fn append_code_must_be_single_char() {
        let entries = vec![StepEntry::new("filter", "Filter.psa", "FF")];
        assert!(matches!(
            ProcessingSequence::from_entries(&entries),
            Err(SequenceError::InvalidAppendCode { .. })
        ));

        let entries = vec![StepEntry::new("filter", "Filter.psa", "")];
        assert!(ProcessingSequence::from_entries(&entries).is_err());
    }

    #[test]
    fn duplicate_append_codes_are_rejected() {
        let entries = vec![
            StepEntry::new("dat_cnv", "DatCnv.psa", "C"),
            StepEntry::new("filter", "Filter.psa", "F"),
            StepEntry::new("wild_edit", "WildEdit.psa", "F"),
        ];
        assert_eq!(
            ProcessingSequence::from_entries(&entries),
            Err(SequenceError::DuplicateAppendCode { code: 'F' })
        );
    }

    #[test]
    fn conversion_code_is_reserved() {
        let renamed = vec![
            StepEntry::new("dat_cnv", "DatCnv.psa", "X"),
            StepEntry::new("filter", "Filter.psa", "C"),
        ];
        assert_eq!(
            ProcessingSequence::from_entries(&renamed),
            Err(SequenceError::ConversionCode { append: 'X' })
        );

        let no_conversion = vec![StepEntry::new("filter", "Filter.psa", "C")];
        assert_eq!(
            ProcessingSequence::from_entries(&no_conversion),
            Err(SequenceError::DuplicateAppendCode { code: 'C' })
        );
    }

    #[test]
    fn chain_suffix_never_repeats_a_code() {
        let entries = vec![
            StepEntry::new("filter", "Filter.psa", "F"),
            StepEntry::new("derive", "Derive.psa", "D"),
        ];
        let seq = ProcessingSequence::from_entries(&entries).unwrap();
        let mut chain = crate::pipeline::StepChain::converted();
        for (_, step) in seq.chained_steps() {
            chain.push(step.append_code);
        }
        assert_eq!(chain.suffix(), "_CFD");
    }

    #[test]
    fn conversion_must_come_first() {
        let entries = vec![
            StepEntry::new("filter", "Filter.psa", "F"),
            StepEntry::new("dat_cnv", "DatCnv.psa", "C"),
        ];
        assert_eq!(
            ProcessingSequence::from_entries(&entries),
            Err(SequenceError::ConversionNotFirst { position: 2 })
        );
    }

    #[test]
    fn chained_steps_skip_conversion_and_keep_positions() {
        let seq = ProcessingSequence::default();
        let chained: Vec<(usize, StepFunction)> =
            seq.chained_steps().map(|(i, s)| (i, s.function)).collect();
        assert_eq!(chained.len(), 6);
        assert_eq!(chained[0], (2, StepFunction::CellThermalMass));
        assert_eq!(chained[5], (7, StepFunction::BinAvg));
    }

    #[test]
    fn function_names_round_trip_through_serde() {
        let json = serde_json::to_string(&StepFunction::DeriveTeos10).unwrap();
        assert_eq!(json, "\"derive_teos10\"");
        for f in StepFunction::ALL {
            assert_eq!(f.as_str().parse::<StepFunction>().unwrap(), f);
        }
    }
}
