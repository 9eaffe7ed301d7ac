//! Error types for workflow operations
//!
//! Each variant maps to a stable error code so a service layer can translate
//! failures without matching on message text.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Referenced issue, status or transition does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A transition or status is owned by a different project than the one using it
    #[error("{entity} {id} belongs to project {owner_project}, not {expected_project}")]
    ProjectMismatch {
        entity: &'static str,
        id: i64,
        owner_project: i64,
        expected_project: i64,
    },

    /// Issue is not in the transition's source status
    #[error("issue {issue_id} is in status {current}, transition {transition_id} starts from {expected}")]
    InvalidSourceState {
        issue_id: i64,
        transition_id: i64,
        current: i64,
        expected: i64,
    },

    /// Transition rules rejected the move; carries every unmet rule
    #[error("transition not allowed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// Issue row changed between read and write
    #[error("issue {issue_id} was modified concurrently (expected version {expected})")]
    Conflict { issue_id: i64, expected: i64 },

    #[error("status {status_id} is still used by {issue_count} issue(s)")]
    StatusInUse { status_id: i64, issue_count: i64 },

    #[error("invalid workflow configuration: {0}")]
    InvalidConfiguration(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::NotFound { .. } => "NOT_FOUND",
            WorkflowError::ProjectMismatch { .. } => "PROJECT_MISMATCH",
            WorkflowError::InvalidSourceState { .. } => "INVALID_SOURCE_STATE",
            WorkflowError::ValidationFailed(_) => "VALIDATION_FAILED",
            WorkflowError::Conflict { .. } => "CONFLICT",
            WorkflowError::StatusInUse { .. } => "STATUS_IN_USE",
            WorkflowError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            WorkflowError::Persistence(_) => "PERSISTENCE_FAILURE",
            WorkflowError::Serialization(_) => "SERIALIZATION_ERROR",
            WorkflowError::Io(_) => "IO_ERROR",
        }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        WorkflowError::NotFound { entity, id }
    }

    /// Unmet rules, when the error is a validation failure
    pub fn validation_errors(&self) -> Option<&[String]> {
        match self {
            WorkflowError::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Failure of a single post-transition action. Never surfaces from `perform`.
#[derive(Debug, Error)]
pub enum PostActionError {
    #[error("malformed {kind} action: {reason}")]
    Malformed { kind: String, reason: String },

    #[error("cannot set field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error(transparent)]
    Store(#[from] WorkflowError),
}
