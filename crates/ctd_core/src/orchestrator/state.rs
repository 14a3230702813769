//! Lifecycle of one cast through the pipeline.

use std::fmt;

use serde::Serialize;

/// Stage a cast has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CastStage {
    Pending,
    /// A dated configuration folder was found.
    ConfigResolved,
    /// No configuration folder; pre-staged files will be used.
    ConfigMissing,
    DirectorySetUp,
    Converting,
    Stepping,
    Completed,
    Failed,
}

impl CastStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CastStage::Pending => "pending",
            CastStage::ConfigResolved => "config_resolved",
            CastStage::ConfigMissing => "config_missing",
            CastStage::DirectorySetUp => "directory_set_up",
            CastStage::Converting => "converting",
            CastStage::Stepping => "stepping",
            CastStage::Completed => "completed",
            CastStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CastStage::Completed | CastStage::Failed)
    }

    /// Whether `next` may follow this stage.
    pub fn can_transition_to(&self, next: CastStage) -> bool {
        use CastStage::*;

        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, ConfigResolved)
                | (Pending, ConfigMissing)
                | (ConfigResolved, DirectorySetUp)
                | (ConfigMissing, DirectorySetUp)
                | (DirectorySetUp, Converting)
                | (Converting, Stepping)
                | (Stepping, Completed)
        )
    }
}

impl fmt::Display for CastStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
