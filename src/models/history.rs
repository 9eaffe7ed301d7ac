use crate::models::rules::PostAction;
use serde::{Deserialize, Serialize};

/// Outcome of one rule evaluated by the transition validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub kind: String, // "role" | "condition" | "validator"
    pub name: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvaluation {
    pub allowed: bool,
    pub errors: Vec<String>,
    pub checks: Vec<CheckOutcome>,
}

/// Append-only audit record written in the same transaction as the status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionHistory {
    pub id: i64,
    pub issue_id: i64,
    pub transition_id: Option<i64>, // cleared if the transition is deleted later
    pub from_status_id: i64,
    pub to_status_id: i64,
    pub actor_id: i64,
    pub validation: TransitionEvaluation,
    pub post_actions: Vec<PostAction>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewHistoryRecord {
    pub issue_id: i64,
    pub transition_id: i64,
    pub from_status_id: i64,
    pub to_status_id: i64,
    pub actor_id: i64,
    pub validation: TransitionEvaluation,
    pub post_actions: Vec<PostAction>,
}
