use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a disruption.
///
/// ```text
/// Selecting -> Injecting -> Holding -> CleaningUp -> Completed
///                                        ^    |
///                                        |    v
///                                   StuckOnRemoval
/// Selecting | Injecting -> Failed
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum LifecyclePhase {
    #[default]
    Selecting,
    Injecting,
    Holding,
    CleaningUp,
    StuckOnRemoval,
    Completed,
    Failed,
}

impl LifecyclePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecyclePhase::Completed | LifecyclePhase::Failed)
    }

    /// Phases in which faults may be present on targets.
    pub fn is_ongoing(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::Holding | LifecyclePhase::CleaningUp | LifecyclePhase::StuckOnRemoval
        )
    }

    pub fn is_cleaning(&self) -> bool {
        matches!(self, LifecyclePhase::CleaningUp | LifecyclePhase::StuckOnRemoval)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Selecting => "Selecting",
            LifecyclePhase::Injecting => "Injecting",
            LifecyclePhase::Holding => "Holding",
            LifecyclePhase::CleaningUp => "CleaningUp",
            LifecyclePhase::StuckOnRemoval => "StuckOnRemoval",
            LifecyclePhase::Completed => "Completed",
            LifecyclePhase::Failed => "Failed",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
