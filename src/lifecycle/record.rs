use crate::types::TargetRef;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-target injection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum InjectionState {
    /// Selected, fault not applied yet
    Pending,
    /// Fault applied and not removed
    Injected,
    /// Given up on, no fault present
    Failed,
    /// Target disappeared, nothing to do
    Skipped,
    /// Fault removed
    Cleaned,
}

impl InjectionState {
    /// No further injector call will be made for this record.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            InjectionState::Failed | InjectionState::Skipped | InjectionState::Cleaned
        )
    }
}

/// Tracks one target of one disruption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InjectionRecord {
    pub target: TargetRef,
    pub state: InjectionState,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_at: Option<DateTime<Utc>>,
    /// Injector calls made
    #[serde(default)]
    pub attempts: u32,
    /// Consecutive failed health checks while pending
    #[serde(default)]
    pub health_failures: u32,
    /// Failed removals
    #[serde(default)]
    pub stuck_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl InjectionRecord {
    pub fn new(target: TargetRef, now: DateTime<Utc>) -> Self {
        Self {
            target,
            state: InjectionState::Pending,
            started_at: now,
            injected_at: None,
            cleaned_at: None,
            attempts: 0,
            health_failures: 0,
            stuck_count: 0,
            last_error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == InjectionState::Pending
    }

    /// The fault is currently applied on the target.
    pub fn carries_fault(&self) -> bool {
        self.state == InjectionState::Injected
    }

    pub fn was_injected(&self) -> bool {
        self.injected_at.is_some()
    }

    /// An injected record with at least one failed removal.
    pub fn is_stuck(&self) -> bool {
        self.carries_fault() && self.stuck_count > 0
    }

    pub(crate) fn mark_injected(&mut self, now: DateTime<Utc>) {
        self.state = InjectionState::Injected;
        self.injected_at = Some(now);
        self.health_failures = 0;
        self.last_error = None;
    }

    pub(crate) fn mark_cleaned(&mut self, now: DateTime<Utc>) {
        self.state = InjectionState::Cleaned;
        self.cleaned_at = Some(now);
        self.last_error = None;
    }

    pub(crate) fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.state = InjectionState::Skipped;
        self.last_error = Some(reason.into());
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = InjectionState::Failed;
        self.last_error = Some(reason.into());
    }
}
