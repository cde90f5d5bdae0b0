use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::errors::WorkflowError;
use super::types::*;
use crate::variants::VariantProfile;

/// A timed task the machine is waiting on. The generation changes every time a
/// wait is (re)armed so completions from an earlier wait are recognisably stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wait {
    pub kind: TaskKind,
    pub generation: u64,
}

/// Inputs that can change the workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    Intent(Intent),
    TaskSettled {
        kind: TaskKind,
        generation: u64,
        outcome: TaskOutcome,
    },
}

/// Audit trail entry for a stage change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Stage,
    pub to: Stage,
    /// Intent or task that caused the transition
    pub trigger: String,
    /// Workflow clock reading when the transition happened
    pub clock_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Pre-flight workflow transition rules.
///
/// Owns the current stage and every piece of per-stage data. Time is not
/// handled here: the machine declares what it is waiting for through
/// [`FlightStateMachine::wait`] and the owner arms a timer for it.
#[derive(Debug, Clone)]
pub struct FlightStateMachine {
    variant: String,
    profile: VariantProfile,
    countdown_seconds: u32,
    stage: Stage,
    checks: Vec<PreflightCheck>,
    flight_plan: FlightPlan,
    upload: Option<MissionUploadState>,
    countdown: Option<CountdownState>,
    wait: Option<Wait>,
    generation: u64,
    last_failure: Option<WorkflowError>,
    history: Vec<TransitionRecord>,
}

impl FlightStateMachine {
    pub fn new(variant: impl Into<String>, profile: VariantProfile, countdown_seconds: u32) -> Self {
        Self {
            variant: variant.into(),
            profile,
            countdown_seconds,
            stage: Stage::Idle,
            checks: Vec::new(),
            flight_plan: FlightPlan::default(),
            upload: None,
            countdown: None,
            wait: None,
            generation: 0,
            last_failure: None,
            history: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// The timed task the machine is currently waiting on
    pub fn wait(&self) -> Option<Wait> {
        self.wait
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Names the items a task operates on, handed to the outcome source
    pub fn task_subjects(&self, kind: TaskKind) -> Vec<String> {
        match kind {
            TaskKind::PreflightChecks => self.checks.iter().map(|check| check.name.clone()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn snapshot(&self, pending: Option<PendingTask>, clock_ms: u64) -> WorkflowSnapshot {
        WorkflowSnapshot {
            variant: self.variant.clone(),
            aircraft: self.profile.aircraft.clone(),
            system_id: self.profile.system_id,
            stage: self.stage,
            final_stage: self.profile.final_stage,
            checks: self.checks.clone(),
            flight_plan: self.flight_plan.clone(),
            upload: self.upload,
            countdown: self.countdown,
            pending,
            last_failure: self.last_failure.clone(),
            clock_ms,
        }
    }

    pub fn handle_event(&mut self, event: &WorkflowEvent, clock_ms: u64) -> IntentOutcome {
        match event {
            WorkflowEvent::Intent(intent) => self.handle_intent(intent, clock_ms),
            WorkflowEvent::TaskSettled {
                kind,
                generation,
                outcome,
            } => {
                if self.handle_task(*kind, *generation, outcome, clock_ms) {
                    IntentOutcome::Accepted
                } else {
                    IntentOutcome::Unchanged
                }
            }
        }
    }

    /// Apply an operator intent. Guards are checked against the machine's own
    /// state; a rejected intent leaves everything untouched.
    pub fn handle_intent(&mut self, intent: &Intent, clock_ms: u64) -> IntentOutcome {
        let outcome = match (self.stage, intent) {
            (_, Intent::Reset) => self.reset(clock_ms),

            (Stage::Idle, Intent::Connect) => {
                self.advance(Stage::Connecting, intent, clock_ms, |sm| {
                    sm.begin_wait(TaskKind::Connection)
                })
            }

            (Stage::Connected, Intent::ProceedToChecks) => {
                self.advance(Stage::ChecksRunning, intent, clock_ms, |sm| {
                    sm.checks = sm
                        .profile
                        .checks
                        .iter()
                        .map(PreflightCheck::pending)
                        .collect();
                    sm.begin_wait(TaskKind::PreflightChecks);
                })
            }

            (Stage::ChecksComplete, Intent::ProceedToDestination) => {
                self.advance(Stage::DestinationSelection, intent, clock_ms, |_| {})
            }
            (Stage::DestinationSelection, Intent::ProceedToDestination) => IntentOutcome::Unchanged,

            (Stage::DestinationSelection, Intent::SetFlightPlanField { field, value }) => {
                self.select(*field, value)
            }

            (Stage::DestinationSelection, Intent::ProceedToUpload) => {
                if self.flight_plan.is_complete() {
                    self.advance(Stage::MissionReview, intent, clock_ms, |_| {})
                } else {
                    warn!(
                        missing = ?self.flight_plan.missing_fields(),
                        "Flight plan incomplete, staying in destination selection"
                    );
                    self.reject(intent)
                }
            }
            (Stage::MissionReview, Intent::ProceedToUpload) => IntentOutcome::Unchanged,

            (Stage::MissionReview, Intent::UploadMission) if self.flight_plan.is_complete() => {
                self.advance(Stage::Uploading, intent, clock_ms, |sm| {
                    sm.upload = Some(MissionUploadState { uploading: true });
                    sm.begin_wait(TaskKind::MissionUpload);
                })
            }

            (Stage::TakeoffReady, Intent::InitiateTakeoff) => {
                self.advance(Stage::CountingDown, intent, clock_ms, |sm| {
                    sm.countdown = Some(CountdownState::armed(sm.countdown_seconds));
                    sm.begin_wait(TaskKind::CountdownTick);
                })
            }
            (Stage::CountingDown | Stage::Launched, Intent::InitiateTakeoff) => IntentOutcome::Unchanged,

            // Stages that wait on a fallible task: re-issuing the entering intent
            // while the task is running is a duplicate, after a failure it retries.
            (stage, intent) => match Self::retry_target(stage, intent) {
                Some(kind) if self.last_failure.is_some() => self.retry(kind),
                Some(_) if !matches!(intent, Intent::Retry) => IntentOutcome::Unchanged,
                _ => self.reject(intent),
            },
        };

        if let IntentOutcome::Rejected(error) = &outcome {
            warn!(
                variant = %self.variant,
                intent = intent.name(),
                stage = %self.stage,
                error = %error,
                "Intent rejected"
            );
        }
        outcome
    }

    /// Apply a timer completion. Returns false when the completion is stale,
    /// i.e. it does not belong to the wait currently in effect.
    pub fn handle_task(
        &mut self,
        kind: TaskKind,
        generation: u64,
        outcome: &TaskOutcome,
        clock_ms: u64,
    ) -> bool {
        match self.wait {
            Some(wait) if wait.kind == kind && wait.generation == generation => {}
            _ => {
                debug!(kind = %kind, generation, "Ignoring stale task completion");
                return false;
            }
        }
        self.wait = None;
        let trigger = kind.to_string();

        match (self.stage, kind) {
            (Stage::Connecting, TaskKind::Connection) => match outcome {
                TaskOutcome::Success => self.settle(Stage::Connected, &trigger, clock_ms),
                TaskOutcome::Failure { reason, .. } => self.fail(WorkflowError::ConnectionFailure {
                    reason: reason.clone(),
                }),
            },

            (Stage::ChecksRunning, TaskKind::PreflightChecks) => match outcome {
                TaskOutcome::Success => {
                    // All checks finish together
                    for check in &mut self.checks {
                        check.status = CheckStatus::Completed;
                    }
                    self.settle(Stage::ChecksComplete, &trigger, clock_ms);
                }
                TaskOutcome::Failure { subject, reason } => {
                    let check_name = subject
                        .clone()
                        .or_else(|| self.checks.first().map(|check| check.name.clone()))
                        .unwrap_or_default();
                    self.fail(WorkflowError::CheckFailure {
                        check_name,
                        reason: reason.clone(),
                    });
                }
            },

            (Stage::Uploading, TaskKind::MissionUpload) => match outcome {
                TaskOutcome::Success => {
                    self.upload = None;
                    self.settle(Stage::TakeoffReady, &trigger, clock_ms);
                }
                TaskOutcome::Failure { reason, .. } => {
                    self.upload = Some(MissionUploadState { uploading: false });
                    self.fail(WorkflowError::UploadFailure {
                        reason: reason.clone(),
                    });
                }
            },

            (Stage::CountingDown, TaskKind::CountdownTick) => {
                let tick = self
                    .countdown
                    .as_mut()
                    .map_or(TickResult::Inactive, CountdownState::tick);
                match tick {
                    TickResult::Ticked { seconds_remaining } => {
                        debug!(seconds_remaining, "Countdown tick");
                        self.begin_wait(TaskKind::CountdownTick);
                    }
                    TickResult::Launched => {
                        info!(variant = %self.variant, "Launch");
                        self.settle(Stage::Launched, &trigger, clock_ms);
                        self.begin_wait(TaskKind::PostLaunch);
                    }
                    TickResult::Inactive => {}
                }
            }

            (Stage::Launched, TaskKind::PostLaunch) => {
                self.settle(Stage::FlightComplete, &trigger, clock_ms)
            }

            (stage, kind) => {
                warn!(stage = %stage, kind = %kind, "Task completion does not match stage");
                return false;
            }
        }
        true
    }

    fn retry_target(stage: Stage, intent: &Intent) -> Option<TaskKind> {
        match (stage, intent) {
            (Stage::Connecting, Intent::Connect | Intent::Retry) => Some(TaskKind::Connection),
            (Stage::ChecksRunning, Intent::ProceedToChecks | Intent::Retry) => {
                Some(TaskKind::PreflightChecks)
            }
            (Stage::Uploading, Intent::UploadMission | Intent::Retry) => Some(TaskKind::MissionUpload),
            _ => None,
        }
    }

    /// Move forward one stage on an intent. `enter` sets up the new stage's data.
    fn advance(
        &mut self,
        next: Stage,
        intent: &Intent,
        clock_ms: u64,
        enter: impl FnOnce(&mut Self),
    ) -> IntentOutcome {
        if !self.profile.includes(next) {
            return self.reject(intent);
        }
        enter(self);
        self.settle(next, intent.name(), clock_ms);
        IntentOutcome::Accepted
    }

    fn settle(&mut self, next: Stage, trigger: &str, clock_ms: u64) {
        debug_assert_eq!(self.stage.next(), Some(next), "stages are never skipped");
        self.record_transition(self.stage, next, trigger, clock_ms);
        self.stage = next;
        self.last_failure = None;
    }

    fn record_transition(&mut self, from: Stage, to: Stage, trigger: &str, clock_ms: u64) {
        let record = TransitionRecord {
            from,
            to,
            trigger: trigger.to_string(),
            clock_ms,
            recorded_at: Utc::now(),
        };

        info!(
            variant = %self.variant,
            from = %record.from,
            to = %record.to,
            trigger = %record.trigger,
            clock_ms = record.clock_ms,
            "Workflow stage transition"
        );

        self.history.push(record);
    }

    fn begin_wait(&mut self, kind: TaskKind) {
        self.generation += 1;
        self.wait = Some(Wait {
            kind,
            generation: self.generation,
        });
    }

    fn fail(&mut self, error: WorkflowError) {
        warn!(
            variant = %self.variant,
            stage = %self.stage,
            error = %error,
            "Timed task failed, waiting for retry"
        );
        self.last_failure = Some(error);
    }

    fn retry(&mut self, kind: TaskKind) -> IntentOutcome {
        info!(variant = %self.variant, stage = %self.stage, kind = %kind, "Retrying task");
        self.last_failure = None;
        if kind == TaskKind::MissionUpload {
            self.upload = Some(MissionUploadState { uploading: true });
        }
        self.begin_wait(kind);
        IntentOutcome::Accepted
    }

    fn select(&mut self, field: FlightPlanField, value: &str) -> IntentOutcome {
        if !value.is_empty() && !self.profile.options.permits(field, value) {
            return IntentOutcome::Rejected(WorkflowError::InvalidSelection {
                field,
                value: value.to_string(),
            });
        }
        if self.flight_plan.get(field).unwrap_or_default() == value {
            return IntentOutcome::Unchanged;
        }
        debug!(field = %field, value, "Flight plan field selected");
        self.flight_plan.set(field, Some(value.to_string()));
        IntentOutcome::Accepted
    }

    fn reject(&self, intent: &Intent) -> IntentOutcome {
        IntentOutcome::Rejected(WorkflowError::invalid_transition(intent.name(), self.stage))
    }

    fn is_pristine(&self) -> bool {
        self.stage == Stage::Idle
            && self.wait.is_none()
            && self.checks.is_empty()
            && self.flight_plan == FlightPlan::default()
            && self.upload.is_none()
            && self.countdown.is_none()
            && self.last_failure.is_none()
    }

    /// Return to `Idle` and discard all sub-state
    fn reset(&mut self, clock_ms: u64) -> IntentOutcome {
        if self.is_pristine() {
            return IntentOutcome::Unchanged;
        }
        if self.stage != Stage::Idle {
            self.record_transition(self.stage, Stage::Idle, Intent::Reset.name(), clock_ms);
        }
        self.stage = Stage::Idle;
        self.checks.clear();
        self.flight_plan = FlightPlan::default();
        self.upload = None;
        self.countdown = None;
        self.last_failure = None;
        // Invalidate whatever was in flight
        self.wait = None;
        self.generation += 1;
        IntentOutcome::Accepted
    }
}
