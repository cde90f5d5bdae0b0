use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{FlightPlanField, Stage};

/// Errors raised inside the workflow core.
///
/// `InvalidTransition` and `InvalidSelection` are rejected intents: the core stays
/// where it was. The remaining variants are timed-task failures, which park the
/// workflow in the current stage until the operator retries or resets.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowError {
    #[error("Invalid transition: `{intent}` is not allowed in stage {stage}")]
    InvalidTransition { intent: String, stage: Stage },

    #[error("Invalid selection: `{value}` is not a candidate for {field}")]
    InvalidSelection { field: FlightPlanField, value: String },

    #[error("Connection to aircraft failed: {reason}")]
    ConnectionFailure { reason: String },

    #[error("Pre-flight check `{check_name}` failed: {reason}")]
    CheckFailure { check_name: String, reason: String },

    #[error("Mission upload failed: {reason}")]
    UploadFailure { reason: String },
}

impl WorkflowError {
    pub fn invalid_transition(intent: &str, stage: Stage) -> Self {
        WorkflowError::InvalidTransition {
            intent: intent.to_string(),
            stage,
        }
    }

    /// Failures of timed tasks can be retried; rejected intents cannot
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::ConnectionFailure { .. }
                | WorkflowError::CheckFailure { .. }
                | WorkflowError::UploadFailure { .. }
        )
    }
}
