//! The disruption state machine.
//!
//! [`LifecycleEngine::tick`] advances one [`DisruptionRun`] as far as it can
//! without waiting: a tick that enters `Injecting` goes on to inject, a tick
//! that finds the holding window elapsed goes on to clean up. It stops at the
//! first phase that has to wait for the cluster or the clock and reports a
//! suggested requeue delay.

use super::claims::TargetClaims;
use super::phase::LifecyclePhase;
use super::record::{InjectionRecord, InjectionState};
use super::status::DisruptionStatus;
use crate::clock::{elapsed, Clock};
use crate::config::EngineConfig;
use crate::disruption::DisruptionSpec;
use crate::error::ChaosError;
use crate::injector::Injector;
use crate::metrics::{self, report, MetricsSink};
use crate::selector::TargetSelector;
use crate::types::{DisruptionKey, TargetRef};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on phases visited in one tick.
const MAX_STEPS_PER_TICK: usize = 8;

/// One disruption as owned by the engine.
#[derive(Debug, Clone)]
pub struct DisruptionRun {
    pub key: DisruptionKey,
    pub spec: DisruptionSpec,
    pub status: DisruptionStatus,
}

impl DisruptionRun {
    pub fn new(key: DisruptionKey, spec: DisruptionSpec, now: DateTime<Utc>) -> Self {
        Self {
            key,
            spec,
            status: DisruptionStatus::new(now),
        }
    }

    /// Pick up a disruption from a previously persisted status.
    pub fn resume(key: DisruptionKey, spec: DisruptionSpec, status: DisruptionStatus) -> Self {
        Self { key, spec, status }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.status.phase
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags = self.spec.tags();
        tags.push(format!("disruption_name:{}", self.key.name));
        tags.push(format!("namespace:{}", self.key.namespace));
        tags
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Phase before the tick
    pub previous: LifecyclePhase,
    /// Phase after the tick
    pub phase: LifecyclePhase,
    /// Phases entered during the tick, in order
    pub transitions: Vec<LifecyclePhase>,
    /// When to tick again; `None` once terminal
    pub requeue_after: Option<Duration>,
}

impl TickOutcome {
    pub fn changed(&self) -> bool {
        !self.transitions.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

enum Flow {
    /// Phase changed and the new phase can run right away
    Continue,
    /// Wait for the next tick
    Yield,
}

enum Attempt {
    Injected,
    Absent(ChaosError),
    Unhealthy(ChaosError),
    InjectorFailed(ChaosError),
}

enum Removal {
    Removed,
    Absent(ChaosError),
    Failed(ChaosError),
}

/// Drives disruptions through their lifecycle.
pub struct LifecycleEngine {
    selector: Arc<dyn TargetSelector>,
    injector: Arc<dyn Injector>,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    claims: Arc<TargetClaims>,
    config: EngineConfig,
}

impl LifecycleEngine {
    pub fn new(
        selector: Arc<dyn TargetSelector>,
        injector: Arc<dyn Injector>,
        sink: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            selector,
            injector,
            sink,
            clock,
            claims: Arc::new(TargetClaims::new()),
            config,
        }
    }

    pub fn claims(&self) -> &Arc<TargetClaims> {
        &self.claims
    }

    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Advance `run` by one reconcile cycle.
    ///
    /// Lifecycle errors never escape: they end up in the records, in the
    /// status message or in a terminal phase.
    pub async fn tick(&self, run: &mut DisruptionRun) -> TickOutcome {
        let started = Instant::now();
        let tags = run.tags();
        let previous = run.status.phase;
        let mut transitions = Vec::new();

        report(metrics::METRIC_RECONCILE, self.sink.metric_reconcile());

        if !previous.is_terminal() {
            if run.status.delete_requested && !previous.is_cleaning() {
                self.begin_cleanup(run, "deletion requested", &tags);
                transitions.push(run.status.phase);
            }

            for _ in 0..MAX_STEPS_PER_TICK {
                let phase = run.status.phase;
                let flow = match phase {
                    LifecyclePhase::Selecting => self.select(run, &tags).await,
                    LifecyclePhase::Injecting => self.inject(run, &tags).await,
                    LifecyclePhase::Holding => self.hold(run, &tags).await,
                    LifecyclePhase::CleaningUp | LifecyclePhase::StuckOnRemoval => {
                        self.clean(run, &tags).await
                    }
                    LifecyclePhase::Completed | LifecyclePhase::Failed => break,
                };
                if run.status.phase != phase {
                    transitions.push(run.status.phase);
                }
                if matches!(flow, Flow::Yield) {
                    break;
                }
            }
        }

        run.status.refresh_counts();
        let now = self.clock.now();
        if !run.status.is_terminal() {
            let ongoing = elapsed(run.status.created_at, now);
            run.status.ongoing_duration = Some(ongoing);
            report(
                metrics::METRIC_ONGOING_DURATION,
                self.sink.metric_disruption_ongoing_duration(ongoing, &tags),
            );
        }
        report(
            metrics::METRIC_RECONCILE_DURATION,
            self.sink.metric_reconcile_duration(started.elapsed(), &tags),
        );

        TickOutcome {
            previous,
            phase: run.status.phase,
            transitions,
            requeue_after: self.requeue_after(run, now),
        }
    }

    async fn select(&self, run: &mut DisruptionRun, tags: &[String]) -> Flow {
        let candidates = match self.selector.get_matching(&run.spec).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(disruption = %run.key, error = %e, "Target selection failed");
                self.finish(
                    run,
                    LifecyclePhase::Failed,
                    Some(format!("target selection failed: {}", e)),
                    tags,
                );
                return Flow::Yield;
            }
        };

        let matched = candidates.len();
        let key = run.key.clone();
        let chosen: Vec<TargetRef> = candidates
            .into_iter()
            .filter(|t| t.healthy)
            .map(|t| t.reference)
            .filter(|target| self.claims.claim(target, &key))
            .take(run.spec.count as usize)
            .collect();

        if chosen.is_empty() {
            if run.spec.allow_empty_selection {
                info!(disruption = %run.key, matched, "No eligible targets, nothing to do");
                self.finish(
                    run,
                    LifecyclePhase::Completed,
                    Some("no matching targets".to_string()),
                    tags,
                );
            } else {
                let e = ChaosError::NoMatchingTargets(run.spec.label_selector());
                warn!(disruption = %run.key, matched, "{}", e);
                self.finish(run, LifecyclePhase::Failed, Some(e.to_string()), tags);
            }
            return Flow::Yield;
        }

        let now = self.clock.now();
        info!(
            disruption = %run.key,
            matched,
            selected = chosen.len(),
            "Selected targets"
        );
        run.status.records = chosen
            .into_iter()
            .map(|target| InjectionRecord::new(target, now))
            .collect();
        run.status.injecting_started_at = Some(now);
        self.enter(run, LifecyclePhase::Injecting);
        Flow::Continue
    }

    async fn inject(&self, run: &mut DisruptionRun, tags: &[String]) -> Flow {
        let pending: Vec<(usize, TargetRef)> = run
            .status
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_pending())
            .map(|(idx, r)| (idx, r.target.clone()))
            .collect();

        let spec = &run.spec;
        let attempts: Vec<(usize, Attempt)> = stream::iter(pending)
            .map(|(idx, target)| async move {
                let attempt = match self.selector.target_is_healthy(&target, spec).await {
                    Ok(()) => match self.injector.inject(&target, spec.kind).await {
                        Ok(()) => Attempt::Injected,
                        Err(e) if e.is_absent() => Attempt::Absent(e),
                        Err(e) => Attempt::InjectorFailed(e),
                    },
                    Err(e) if e.is_absent() => Attempt::Absent(e),
                    Err(e) => Attempt::Unhealthy(e),
                };
                (idx, attempt)
            })
            .buffered(self.config.max_concurrent_injections)
            .collect()
            .await;

        let now = self.clock.now();
        let kind = run.spec.kind;
        for (idx, attempt) in attempts {
            let record = &mut run.status.records[idx];
            match attempt {
                Attempt::Injected => {
                    record.attempts += 1;
                    record.mark_injected(now);
                    report(
                        metrics::METRIC_INJECTED,
                        self.sink.metric_injected(true, kind, tags),
                    );
                    debug!(disruption = %run.key, target = %record.target, "Fault injected");
                }
                Attempt::InjectorFailed(e) => {
                    record.attempts += 1;
                    record.health_failures = 0;
                    report(
                        metrics::METRIC_INJECTED,
                        self.sink.metric_injected(false, kind, tags),
                    );
                    if !e.is_retryable() || record.attempts >= self.config.injection_retry_limit {
                        warn!(
                            disruption = %run.key,
                            target = %record.target,
                            attempts = record.attempts,
                            error = %e,
                            "Giving up on injection"
                        );
                        record.mark_failed(e.to_string());
                        self.claims.release(&record.target, &run.key);
                    } else {
                        debug!(disruption = %run.key, target = %record.target, error = %e, "Injection failed, will retry");
                        record.last_error = Some(e.to_string());
                    }
                }
                Attempt::Absent(e) => {
                    info!(disruption = %run.key, target = %record.target, "Target gone, skipping");
                    record.mark_skipped(e.to_string());
                    self.claims.release(&record.target, &run.key);
                }
                Attempt::Unhealthy(e) => {
                    record.health_failures += 1;
                    if record.health_failures >= self.config.health_failure_threshold {
                        warn!(
                            disruption = %run.key,
                            target = %record.target,
                            checks = record.health_failures,
                            error = %e,
                            "Target stayed unhealthy, giving up"
                        );
                        record.mark_failed(e.to_string());
                        self.claims.release(&record.target, &run.key);
                    } else {
                        record.last_error = Some(e.to_string());
                    }
                }
            }
        }

        let records = &run.status.records;
        if records.iter().any(InjectionRecord::is_pending) {
            return Flow::Yield;
        }
        if !records.iter().any(InjectionRecord::was_injected) {
            if run.status.records.iter().all(|r| r.state == InjectionState::Skipped) {
                self.finish(
                    run,
                    LifecyclePhase::Completed,
                    Some("every selected target disappeared before injection".to_string()),
                    tags,
                );
                return Flow::Yield;
            }
            self.finish(
                run,
                LifecyclePhase::Failed,
                Some("no target could be injected".to_string()),
                tags,
            );
            return Flow::Yield;
        }

        let started = run.status.injecting_started_at.unwrap_or(now);
        let last = records
            .iter()
            .filter_map(|r| r.injected_at)
            .max()
            .unwrap_or(now);
        report(
            metrics::METRIC_INJECT_DURATION,
            self.sink.metric_inject_duration(elapsed(started, last), tags),
        );

        run.status.holding_started_at = Some(now);
        self.enter(run, LifecyclePhase::Holding);
        Flow::Continue
    }

    async fn hold(&self, run: &mut DisruptionRun, tags: &[String]) -> Flow {
        let now = self.clock.now();
        if holding_remaining(&run.status, run.spec.duration, now).is_zero() {
            self.begin_cleanup(run, "duration elapsed", tags);
            return Flow::Continue;
        }

        let live: Vec<(usize, TargetRef)> = live_records(&run.status);
        let spec = &run.spec;
        let checks: Vec<(usize, crate::error::Result<()>)> = stream::iter(live)
            .map(|(idx, target)| async move {
                (idx, self.selector.target_is_healthy(&target, spec).await)
            })
            .buffered(self.config.max_concurrent_injections)
            .collect()
            .await;

        for (idx, result) in checks {
            let record = &mut run.status.records[idx];
            match result {
                Ok(()) => {}
                Err(e) if e.is_absent() => {
                    info!(
                        disruption = %run.key,
                        target = %record.target,
                        "Target gone while holding, nothing to clean up"
                    );
                    record.mark_skipped(e.to_string());
                    self.claims.release(&record.target, &run.key);
                }
                Err(e) => {
                    debug!(disruption = %run.key, target = %record.target, error = %e, "Target unhealthy while holding");
                }
            }
        }
        Flow::Yield
    }

    /// Switch to cleanup from any non-terminal phase.
    fn begin_cleanup(&self, run: &mut DisruptionRun, reason: &str, tags: &[String]) {
        if run.status.records.is_empty() {
            self.finish(
                run,
                LifecyclePhase::Completed,
                Some(format!("{} before any target was selected", reason)),
                tags,
            );
            return;
        }

        for record in run.status.records.iter_mut().filter(|r| r.is_pending()) {
            record.mark_skipped(format!("{} before injection", reason));
            self.claims.release(&record.target, &run.key);
        }
        run.status.cleanup_started_at = Some(self.clock.now());
        info!(disruption = %run.key, reason, "Starting cleanup");
        self.enter(run, LifecyclePhase::CleaningUp);
    }

    async fn clean(&self, run: &mut DisruptionRun, tags: &[String]) -> Flow {
        let live = live_records(&run.status);
        let spec = &run.spec;
        let removals: Vec<(usize, Removal)> = stream::iter(live)
            .map(|(idx, target)| async move {
                let removal = match self.selector.target_is_healthy(&target, spec).await {
                    Err(e) if e.is_absent() => Removal::Absent(e),
                    _ => match self.injector.remove(&target, spec.kind).await {
                        Ok(()) => Removal::Removed,
                        Err(e) if e.is_absent() => Removal::Absent(e),
                        Err(e) => Removal::Failed(e),
                    },
                };
                (idx, removal)
            })
            .buffered(self.config.max_concurrent_injections)
            .collect()
            .await;

        let now = self.clock.now();
        let kind = run.spec.kind;
        for (idx, removal) in removals {
            let record = &mut run.status.records[idx];
            match removal {
                Removal::Removed => {
                    record.mark_cleaned(now);
                    self.claims.release(&record.target, &run.key);
                    report(
                        metrics::METRIC_CLEANED,
                        self.sink.metric_cleaned(true, kind, tags),
                    );
                }
                Removal::Absent(e) => {
                    record.mark_skipped(e.to_string());
                    self.claims.release(&record.target, &run.key);
                }
                Removal::Failed(e) => {
                    record.stuck_count += 1;
                    record.last_error = Some(e.to_string());
                    report(
                        metrics::METRIC_CLEANED,
                        self.sink.metric_cleaned(false, kind, tags),
                    );
                    warn!(
                        disruption = %run.key,
                        target = %record.target,
                        failures = record.stuck_count,
                        error = %e,
                        "Fault removal failed"
                    );
                }
            }
        }

        let records = &run.status.records;
        if !records.iter().any(InjectionRecord::carries_fault) {
            let started = run.status.cleanup_started_at.unwrap_or(now);
            report(
                metrics::METRIC_CLEANUP_DURATION,
                self.sink.metric_cleanup_duration(elapsed(started, now), tags),
            );
            self.finish(run, LifecyclePhase::Completed, None, tags);
            return Flow::Yield;
        }

        if records.iter().any(InjectionRecord::is_stuck) {
            report(
                metrics::METRIC_STUCK_ON_REMOVAL,
                self.sink.metric_stuck_on_removal(tags),
            );
        }

        let over_bound = records
            .iter()
            .any(|r| r.carries_fault() && r.stuck_count > self.config.stuck_retry_limit);
        let next = if over_bound {
            LifecyclePhase::StuckOnRemoval
        } else {
            LifecyclePhase::CleaningUp
        };
        if next != run.status.phase {
            if over_bound {
                error!(
                    disruption = %run.key,
                    bound = self.config.stuck_retry_limit,
                    "Disruption stuck on removal, retrying every tick"
                );
            }
            self.enter(run, next);
        }
        Flow::Yield
    }

    /// Enter a terminal phase. Terminal metrics are emitted once.
    fn finish(
        &self,
        run: &mut DisruptionRun,
        phase: LifecyclePhase,
        message: Option<String>,
        tags: &[String],
    ) {
        let now = self.clock.now();
        self.claims.release_all(&run.key);
        if message.is_some() {
            run.status.message = message;
        }
        if run.status.completed_at.is_none() {
            run.status.completed_at = Some(now);
        }
        self.enter(run, phase);

        if run.status.completed_duration.is_none() {
            let total = elapsed(run.status.created_at, now);
            run.status.completed_duration = Some(total);
            run.status.ongoing_duration = Some(total);
            report(
                metrics::METRIC_COMPLETED_DURATION,
                self.sink.metric_disruption_completed_duration(total, tags),
            );
            report(
                metrics::METRIC_DISRUPTIONS_COUNT,
                self.sink.metric_disruptions_count(run.spec.kind, tags),
            );
        }

        if phase == LifecyclePhase::Failed {
            let text = run.status.message.clone().unwrap_or_default();
            report(
                metrics::METRIC_EVENT,
                self.sink.event_with_tags("Disruption failed", &text, tags),
            );
        }
    }

    fn enter(&self, run: &mut DisruptionRun, phase: LifecyclePhase) {
        if run.status.phase != phase {
            info!(
                disruption = %run.key,
                from = %run.status.phase,
                to = %phase,
                "Phase transition"
            );
            run.status.phase = phase;
        }
    }

    fn requeue_after(&self, run: &DisruptionRun, now: DateTime<Utc>) -> Option<Duration> {
        let backoff = &self.config.backoff;
        let records = &run.status.records;
        match run.status.phase {
            LifecyclePhase::Completed | LifecyclePhase::Failed => None,
            LifecyclePhase::Selecting => Some(backoff.initial),
            LifecyclePhase::Injecting => {
                let failures = records
                    .iter()
                    .filter(|r| r.is_pending())
                    .map(|r| r.attempts.max(r.health_failures))
                    .max()
                    .unwrap_or(0);
                Some(backoff.delay(failures))
            }
            LifecyclePhase::Holding => {
                let remaining = holding_remaining(&run.status, run.spec.duration, now);
                Some(remaining.min(self.config.holding_recheck_interval))
            }
            LifecyclePhase::CleaningUp | LifecyclePhase::StuckOnRemoval => {
                let failures = records
                    .iter()
                    .filter(|r| r.carries_fault())
                    .map(|r| r.stuck_count)
                    .max()
                    .unwrap_or(0);
                Some(backoff.delay(failures))
            }
        }
    }
}

/// Time left in the holding window, zero once elapsed.
fn holding_remaining(status: &DisruptionStatus, duration: Duration, now: DateTime<Utc>) -> Duration {
    let started = status.holding_started_at.unwrap_or(now);
    duration.saturating_sub(elapsed(started, now))
}

fn live_records(status: &DisruptionStatus) -> Vec<(usize, TargetRef)> {
    status
        .records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.carries_fault())
        .map(|(idx, r)| (idx, r.target.clone()))
        .collect()
}
