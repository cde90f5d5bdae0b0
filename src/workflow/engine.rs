// Workflow engine - the single owned instance the presentation layer talks to.
//
// Couples the transition rules with the timer queue and the outcome source.
// After every event the armed timer is reconciled with what the machine waits
// on, so leaving a stage or resetting always cancels the previous timer.

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info_span};

use super::state_machine::{FlightStateMachine, TransitionRecord, WorkflowEvent};
use super::timers::{duration_ms, ArmedTimer, TimerQueue};
use super::traits::{AlwaysSucceed, RandomOutcomes, TaskOutcomeSource};
use super::types::*;
use crate::config::{RedwingConfig, TimingConfig};
use crate::variants::VariantProfile;

pub struct FlightWorkflow {
    machine: FlightStateMachine,
    timers: TimerQueue,
    armed: Option<ArmedTimer>,
    timing: TimingConfig,
    outcomes: Box<dyn TaskOutcomeSource>,
}

impl std::fmt::Debug for FlightWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightWorkflow")
            .field("machine", &self.machine)
            .field("timers", &self.timers)
            .field("armed", &self.armed)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl FlightWorkflow {
    pub fn new(variant: impl Into<String>, profile: VariantProfile, timing: TimingConfig) -> Self {
        Self {
            machine: FlightStateMachine::new(variant, profile, timing.countdown_seconds),
            timers: TimerQueue::new(),
            armed: None,
            timing,
            outcomes: Box::new(AlwaysSucceed),
        }
    }

    /// Build a workflow for `variant` (or the configured default) using the
    /// configured timing and failure injection
    pub fn from_config(config: &RedwingConfig, variant: Option<&str>) -> Result<Self> {
        let (name, profile) = config.variant(variant)?;
        let workflow = Self::new(name, profile, config.timing);
        Ok(if config.simulation.failure_rate > 0.0 {
            workflow.with_outcome_source(Box::new(RandomOutcomes::new(
                config.simulation.failure_rate,
                config.simulation.seed,
            )))
        } else {
            workflow
        })
    }

    pub fn with_outcome_source(mut self, outcomes: Box<dyn TaskOutcomeSource>) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub fn stage(&self) -> Stage {
        self.machine.stage()
    }

    pub fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn history(&self) -> &[TransitionRecord] {
        self.machine.history()
    }

    pub fn pending(&self) -> Option<PendingTask> {
        self.armed.map(|timer| timer.as_pending())
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.machine.snapshot(self.pending(), self.timers.now_ms())
    }

    /// Due time of the next timer, if anything is pending
    pub fn next_due_ms(&self) -> Option<u64> {
        self.timers.next_due_ms()
    }

    /// Apply an operator intent
    pub fn dispatch(&mut self, intent: Intent) -> IntentOutcome {
        let span = info_span!("intent", name = intent.name(), variant = self.machine.variant());
        let _guard = span.enter();

        let outcome = self
            .machine
            .handle_event(&WorkflowEvent::Intent(intent), self.timers.now_ms());
        self.sync_timer();
        outcome
    }

    pub fn connect(&mut self) -> IntentOutcome {
        self.dispatch(Intent::Connect)
    }

    pub fn proceed_to_checks(&mut self) -> IntentOutcome {
        self.dispatch(Intent::ProceedToChecks)
    }

    pub fn proceed_to_destination(&mut self) -> IntentOutcome {
        self.dispatch(Intent::ProceedToDestination)
    }

    pub fn set_flight_plan_field(&mut self, field: FlightPlanField, value: impl Into<String>) -> IntentOutcome {
        self.dispatch(Intent::SetFlightPlanField {
            field,
            value: value.into(),
        })
    }

    pub fn proceed_to_upload(&mut self) -> IntentOutcome {
        self.dispatch(Intent::ProceedToUpload)
    }

    pub fn upload_mission(&mut self) -> IntentOutcome {
        self.dispatch(Intent::UploadMission)
    }

    pub fn initiate_takeoff(&mut self) -> IntentOutcome {
        self.dispatch(Intent::InitiateTakeoff)
    }

    pub fn retry(&mut self) -> IntentOutcome {
        self.dispatch(Intent::Retry)
    }

    pub fn reset(&mut self) -> IntentOutcome {
        self.dispatch(Intent::Reset)
    }

    /// Let `by` elapse on the workflow clock, firing due timers in order.
    /// Returns the number of timers fired.
    pub fn advance(&mut self, by: Duration) -> usize {
        let deadline = self.timers.now_ms().saturating_add(duration_ms(by));
        self.advance_to(deadline)
    }

    /// Run the clock up to `deadline_ms`, firing due timers in order
    pub fn advance_to(&mut self, deadline_ms: u64) -> usize {
        let mut fired = 0;
        while let Some(timer) = self.timers.pop_due(deadline_ms) {
            self.fire(timer);
            fired += 1;
        }
        self.timers.advance_clock_to(deadline_ms);
        fired
    }

    /// Fire the next pending timer regardless of how far away it is
    pub fn advance_to_next(&mut self) -> bool {
        match self.timers.next_due_ms() {
            Some(due) => self.advance_to(due) > 0,
            None => false,
        }
    }

    fn fire(&mut self, timer: ArmedTimer) {
        if self.armed.is_some_and(|armed| armed.id == timer.id) {
            self.armed = None;
        }

        let outcome = if timer.kind.is_fallible() {
            let subjects = self.machine.task_subjects(timer.kind);
            self.outcomes.resolve(timer.kind, &subjects)
        } else {
            TaskOutcome::Success
        };

        let span = info_span!("task", kind = %timer.kind, variant = self.machine.variant());
        let _guard = span.enter();

        self.machine.handle_event(
            &WorkflowEvent::TaskSettled {
                kind: timer.kind,
                generation: timer.generation,
                outcome,
            },
            self.timers.now_ms(),
        );
        self.sync_timer();
    }

    /// Make the armed timer match the machine's current wait
    fn sync_timer(&mut self) {
        let wait = self.machine.wait();
        let in_sync = match (wait, self.armed) {
            (Some(wait), Some(armed)) => wait.kind == armed.kind && wait.generation == armed.generation,
            (None, None) => true,
            _ => false,
        };
        if in_sync {
            return;
        }

        if let Some(stale) = self.armed.take() {
            debug!(kind = %stale.kind, "Cancelling superseded timer");
            self.timers.cancel(stale.id);
        }
        if let Some(wait) = wait {
            let delay = self.timing.delay_for(wait.kind);
            self.armed = Some(self.timers.schedule(wait.kind, wait.generation, delay));
        }
    }
}
