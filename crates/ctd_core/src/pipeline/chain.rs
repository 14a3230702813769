//! Step chain: the ordered list of append codes applied to a cast so far.
//!
//! File names are derived from the chain (`<base>_CTF.cnv`), never parsed
//! back out of a file name.

use std::path::{Path, PathBuf};

/// Code applied by the conversion step.
pub const CONVERSION_CODE: char = 'C';

/// Extension of every chained output file.
pub const OUTPUT_EXTENSION: &str = "cnv";

/// Ordered list of applied step codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepChain {
    codes: Vec<char>,
}

impl StepChain {
    /// Chain after the conversion step: `[C]`.
    pub fn converted() -> Self {
        Self {
            codes: vec![CONVERSION_CODE],
        }
    }

    /// Chain that results from appending `code`.
    pub fn with(&self, code: char) -> Self {
        let mut codes = self.codes.clone();
        codes.push(code);
        Self { codes }
    }

    /// Append a code in place.
    pub fn push(&mut self, code: char) {
        self.codes.push(code);
    }

    pub fn codes(&self) -> &[char] {
        &self.codes
    }

    /// File-name suffix, e.g. `_CTF`.
    pub fn suffix(&self) -> String {
        let mut s = String::with_capacity(self.codes.len() + 1);
        s.push('_');
        s.extend(self.codes.iter());
        s
    }

    /// Output file name for a cast base name, e.g. `WQP143_CTF.cnv`.
    pub fn file_name(&self, base_name: &str) -> String {
        format!("{}{}.{}", base_name, self.suffix(), OUTPUT_EXTENSION)
    }

    /// Output path inside a processing directory.
    pub fn path_in(&self, dir: &Path, base_name: &str) -> PathBuf {
        dir.join(self.file_name(base_name))
    }
}

impl Default for StepChain {
    fn default() -> Self {
        Self::converted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_converted() {
        let chain = StepChain::converted();
        assert_eq!(chain.suffix(), "_C");
        assert_eq!(chain.file_name("WQP143"), "WQP143_C.cnv");
    }

    #[test]
    fn grows_one_code_per_step_in_order() {
        let mut chain = StepChain::converted();
        for code in ['T', 'F', 'A'] {
            chain.push(code);
        }
        assert_eq!(chain.codes(), &['C', 'T', 'F', 'A']);
        assert_eq!(chain.suffix(), "_CTFA");
    }

    #[test]
    fn with_leaves_original_untouched() {
        let chain = StepChain::converted();
        let next = chain.with('T');
        assert_eq!(chain.suffix(), "_C");
        assert_eq!(next.suffix(), "_CT");
        assert_eq!(
            next.path_in(Path::new("/proc/cast1"), "cast1"),
            PathBuf::from("/proc/cast1/cast1_CT.cnv")
        );
    }
}
