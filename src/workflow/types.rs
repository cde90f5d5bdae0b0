// Core types for the pre-flight workflow

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::WorkflowError;

/// Position in the linear pre-flight-to-launch sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Connecting,
    Connected,
    ChecksRunning,
    ChecksComplete,
    DestinationSelection,
    MissionReview,
    Uploading,
    TakeoffReady,
    CountingDown,
    Launched,
    FlightComplete,
}

impl Stage {
    /// Every stage in forward order
    pub const ALL: [Stage; 12] = [
        Stage::Idle,
        Stage::Connecting,
        Stage::Connected,
        Stage::ChecksRunning,
        Stage::ChecksComplete,
        Stage::DestinationSelection,
        Stage::MissionReview,
        Stage::Uploading,
        Stage::TakeoffReady,
        Stage::CountingDown,
        Stage::Launched,
        Stage::FlightComplete,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// The stage that directly follows this one, if any
    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    /// Stages left only by an operator intent. Every other stage is left by a timer.
    pub fn awaits_operator(self) -> bool {
        matches!(
            self,
            Stage::Idle
                | Stage::Connected
                | Stage::ChecksComplete
                | Stage::DestinationSelection
                | Stage::MissionReview
                | Stage::TakeoffReady
                | Stage::FlightComplete
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Connecting => "connecting",
            Stage::Connected => "connected",
            Stage::ChecksRunning => "checks_running",
            Stage::ChecksComplete => "checks_complete",
            Stage::DestinationSelection => "destination_selection",
            Stage::MissionReview => "mission_review",
            Stage::Uploading => "uploading",
            Stage::TakeoffReady => "takeoff_ready",
            Stage::CountingDown => "counting_down",
            Stage::Launched => "launched",
            Stage::FlightComplete => "flight_complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Completed,
}

/// One named verification item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightCheck {
    pub name: String,
    pub status: CheckStatus,
}

impl PreflightCheck {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Pending,
        }
    }
}

/// Operator-selectable flight plan parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPlanField {
    Destination,
    TakeoffDirection,
    LandingZone,
    Approach,
}

impl FlightPlanField {
    pub const ALL: [FlightPlanField; 4] = [
        FlightPlanField::Destination,
        FlightPlanField::TakeoffDirection,
        FlightPlanField::LandingZone,
        FlightPlanField::Approach,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FlightPlanField::Destination => "destination",
            FlightPlanField::TakeoffDirection => "takeoff_direction",
            FlightPlanField::LandingZone => "landing_zone",
            FlightPlanField::Approach => "approach",
        }
    }
}

impl fmt::Display for FlightPlanField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The operator-selected destination/approach parameter set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightPlan {
    pub destination: Option<String>,
    pub takeoff_direction: Option<String>,
    pub landing_zone: Option<String>,
    pub approach: Option<String>,
}

impl FlightPlan {
    pub fn get(&self, field: FlightPlanField) -> Option<&str> {
        match field {
            FlightPlanField::Destination => self.destination.as_deref(),
            FlightPlanField::TakeoffDirection => self.takeoff_direction.as_deref(),
            FlightPlanField::LandingZone => self.landing_zone.as_deref(),
            FlightPlanField::Approach => self.approach.as_deref(),
        }
    }

    pub fn set(&mut self, field: FlightPlanField, value: Option<String>) {
        let slot = match field {
            FlightPlanField::Destination => &mut self.destination,
            FlightPlanField::TakeoffDirection => &mut self.takeoff_direction,
            FlightPlanField::LandingZone => &mut self.landing_zone,
            FlightPlanField::Approach => &mut self.approach,
        };
        *slot = value.filter(|v| !v.is_empty());
    }

    pub fn missing_fields(&self) -> Vec<FlightPlanField> {
        FlightPlanField::ALL
            .into_iter()
            .filter(|field| self.get(*field).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Transient state that exists only while the workflow is in `Uploading`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionUploadState {
    pub uploading: bool,
}

/// Result of a single countdown tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// Countdown not running, nothing changed
    Inactive,
    Ticked { seconds_remaining: u32 },
    /// This tick brought the countdown to zero
    Launched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownState {
    pub seconds_remaining: u32,
    pub initiated: bool,
    pub launched: bool,
}

impl CountdownState {
    pub fn armed(seconds: u32) -> Self {
        Self {
            seconds_remaining: seconds,
            initiated: true,
            launched: false,
        }
    }

    /// Decrement by one second. Stops permanently at zero and flags `launched` once.
    pub fn tick(&mut self) -> TickResult {
        if !self.initiated || self.launched || self.seconds_remaining == 0 {
            return TickResult::Inactive;
        }
        self.seconds_remaining -= 1;
        if self.seconds_remaining == 0 {
            self.launched = true;
            TickResult::Launched
        } else {
            TickResult::Ticked {
                seconds_remaining: self.seconds_remaining,
            }
        }
    }
}

/// Timed sub-processes owned by the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Connection,
    PreflightChecks,
    MissionUpload,
    CountdownTick,
    PostLaunch,
}

impl TaskKind {
    /// Whether the task simulates an operation that may fail
    pub fn is_fallible(self) -> bool {
        matches!(
            self,
            TaskKind::Connection | TaskKind::PreflightChecks | TaskKind::MissionUpload
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Connection => "connection",
            TaskKind::PreflightChecks => "preflight_checks",
            TaskKind::MissionUpload => "mission_upload",
            TaskKind::CountdownTick => "countdown_tick",
            TaskKind::PostLaunch => "post_launch",
        };
        f.write_str(name)
    }
}

/// Tagged result of a simulated task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failure {
        /// Item responsible for the failure, e.g. the check that did not pass
        subject: Option<String>,
        reason: String,
    },
}

impl TaskOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        TaskOutcome::Failure {
            subject: None,
            reason: reason.into(),
        }
    }

    pub fn check_failed(check_name: impl Into<String>, reason: impl Into<String>) -> Self {
        TaskOutcome::Failure {
            subject: Some(check_name.into()),
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

/// The explicit waiting sub-state: a timed task that has been armed and not yet settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTask {
    pub kind: TaskKind,
    pub due_at_ms: u64,
}

/// Operator-initiated requests forwarded by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    Connect,
    ProceedToChecks,
    ProceedToDestination,
    SetFlightPlanField { field: FlightPlanField, value: String },
    ProceedToUpload,
    UploadMission,
    InitiateTakeoff,
    Retry,
    Reset,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Connect => "connect",
            Intent::ProceedToChecks => "proceed_to_checks",
            Intent::ProceedToDestination => "proceed_to_destination",
            Intent::SetFlightPlanField { .. } => "set_flight_plan_field",
            Intent::ProceedToUpload => "proceed_to_upload",
            Intent::UploadMission => "upload_mission",
            Intent::InitiateTakeoff => "initiate_takeoff",
            Intent::Retry => "retry",
            Intent::Reset => "reset",
        }
    }
}

/// How the core answered an intent. Intents never fail past the core boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum IntentOutcome {
    Accepted,
    /// Duplicate of an intent already in effect
    Unchanged,
    Rejected(WorkflowError),
}

impl IntentOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IntentOutcome::Accepted)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, IntentOutcome::Rejected(_))
    }
}

/// Read-only view handed to the presentation layer after every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub variant: String,
    pub aircraft: String,
    pub system_id: u32,
    pub stage: Stage,
    pub final_stage: Stage,
    pub checks: Vec<PreflightCheck>,
    pub flight_plan: FlightPlan,
    pub upload: Option<MissionUploadState>,
    pub countdown: Option<CountdownState>,
    pub pending: Option<PendingTask>,
    pub last_failure: Option<WorkflowError>,
    pub clock_ms: u64,
}

impl WorkflowSnapshot {
    pub fn uploading(&self) -> bool {
        self.upload.is_some_and(|upload| upload.uploading)
    }

    pub fn all_checks_completed(&self) -> bool {
        !self.checks.is_empty()
            && self
                .checks
                .iter()
                .all(|check| check.status == CheckStatus::Completed)
    }

    /// True when the checks are all Pending or all Completed
    pub fn checks_uniform(&self) -> bool {
        match self.checks.first() {
            Some(first) => self.checks.iter().all(|check| check.status == first.status),
            None => true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage == self.final_stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_linear() {
        for pair in Stage::ALL.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Stage::FlightComplete.next(), None);
    }

    #[test]
    fn test_countdown_floors_at_zero_and_launches_once() {
        let mut countdown = CountdownState::armed(2);
        assert_eq!(countdown.tick(), TickResult::Ticked { seconds_remaining: 1 });
        assert_eq!(countdown.tick(), TickResult::Launched);
        assert!(countdown.launched);
        assert_eq!(countdown.tick(), TickResult::Inactive);
        assert_eq!(countdown.seconds_remaining, 0);
    }

    #[test]
    fn test_uninitiated_countdown_does_not_tick() {
        let mut countdown = CountdownState {
            seconds_remaining: 10,
            initiated: false,
            launched: false,
        };
        assert_eq!(countdown.tick(), TickResult::Inactive);
        assert_eq!(countdown.seconds_remaining, 10);
    }

    #[test]
    fn test_flight_plan_completeness() {
        let mut plan = FlightPlan::default();
        assert_eq!(plan.missing_fields().len(), 4);

        plan.set(FlightPlanField::Destination, Some("HQ Node".to_string()));
        plan.set(FlightPlanField::Approach, Some("295° [NW]".to_string()));
        assert!(!plan.is_complete());
        assert_eq!(
            plan.missing_fields(),
            vec![FlightPlanField::TakeoffDirection, FlightPlanField::LandingZone]
        );

        plan.set(FlightPlanField::TakeoffDirection, Some("18° [N]".to_string()));
        plan.set(FlightPlanField::LandingZone, Some("HQ Node location 2".to_string()));
        assert!(plan.is_complete());

        // Empty selection clears the field
        plan.set(FlightPlanField::Approach, Some(String::new()));
        assert_eq!(plan.get(FlightPlanField::Approach), None);
    }
}
