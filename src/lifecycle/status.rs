use super::phase::LifecyclePhase;
use super::record::{InjectionRecord, InjectionState};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Aggregate state of one disruption.
///
/// Serialized into the status subresource of the custom resource, so the
/// controller can resume a disruption from it after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionStatus {
    pub phase: LifecyclePhase,
    #[serde(default)]
    pub records: Vec<InjectionRecord>,

    #[serde(default)]
    pub injected_targets: u32,
    #[serde(default)]
    pub cleaned_targets: u32,
    #[serde(default)]
    pub stuck_targets: u32,
    #[serde(default)]
    pub failed_targets: u32,
    #[serde(default)]
    pub skipped_targets: u32,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injecting_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holding_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub ongoing_duration: Option<Duration>,
    /// Set once, when the disruption becomes terminal
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub completed_duration: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub delete_requested: bool,
}

impl DisruptionStatus {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            phase: LifecyclePhase::Selecting,
            records: Vec::new(),
            injected_targets: 0,
            cleaned_targets: 0,
            stuck_targets: 0,
            failed_targets: 0,
            skipped_targets: 0,
            created_at: now,
            injecting_started_at: None,
            holding_started_at: None,
            cleanup_started_at: None,
            completed_at: None,
            ongoing_duration: None,
            completed_duration: None,
            message: None,
            delete_requested: false,
        }
    }

    /// Recompute the per-state counters from the records.
    pub fn refresh_counts(&mut self) {
        self.injected_targets = self.count(InjectionRecord::was_injected);
        self.cleaned_targets = self.count(|r| r.state == InjectionState::Cleaned);
        self.stuck_targets = self.count(InjectionRecord::is_stuck);
        self.failed_targets = self.count(|r| r.state == InjectionState::Failed);
        self.skipped_targets = self.count(|r| r.state == InjectionState::Skipped);
    }

    fn count(&self, pred: impl Fn(&InjectionRecord) -> bool) -> u32 {
        self.records.iter().filter(|r| pred(r)).count() as u32
    }

    /// Targets currently carrying the fault.
    pub fn live_targets(&self) -> usize {
        self.records.iter().filter(|r| r.carries_fault()).count()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}
