// Pre-flight workflow core
//
// Types, transition rules, the timer/clock abstraction and the engine that ties
// them together. The presentation layer only ever sees snapshots and sends intents.

pub mod driver;
pub mod engine;
pub mod errors;
pub mod state_machine;
pub mod timers;
pub mod traits;
pub mod types;


pub use driver::WorkflowHandle;
pub use engine::FlightWorkflow;
pub use errors::WorkflowError;
pub use state_machine::{FlightStateMachine, TransitionRecord, WorkflowEvent};
pub use traits::{AlwaysSucceed, RandomOutcomes, ScriptedOutcomes, TaskOutcomeSource};
pub use types::{
    CheckStatus, CountdownState, FlightPlan, FlightPlanField, Intent, IntentOutcome,
    MissionUploadState, PendingTask, PreflightCheck, Stage, TaskKind, TaskOutcome,
    WorkflowSnapshot,
};
