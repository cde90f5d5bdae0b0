// Redwing Library - guided pre-flight and launch workflow
// This exposes the core components for testing and integration

pub mod config;
pub mod telemetry;
pub mod variants;
pub mod workflow;

// Re-export key types for easy access
pub use config::{RedwingConfig, TimingConfig};
pub use telemetry::{create_session_span, generate_session_id, init_telemetry};
pub use variants::{builtin_variants, FlightPlanOptions, VariantProfile};
pub use workflow::{
    FlightWorkflow, Intent, IntentOutcome, Stage, WorkflowError, WorkflowHandle, WorkflowSnapshot,
};
