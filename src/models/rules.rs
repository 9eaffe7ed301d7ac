//! Typed transition rules.
//!
//! Conditions and post-actions are stored as `{"type": "...", ...}` JSON objects.
//! They are decoded into closed enums when a transition is loaded; unrecognised
//! tags become `Unknown` and known tags with a bad payload become `Malformed`,
//! so both survive a save/load cycle unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Untyped rule as it appears in the JSON columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRule {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl RawRule {
    pub fn new(kind: &str) -> Self {
        RawRule {
            kind: kind.to_string(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRule", into = "RawRule")]
pub enum Condition {
    AssigneeRequired,
    DescriptionRequired,
    EstimatedTimeRequired,
    /// Reserved: always passes until subtasks are modelled.
    SubtasksCompleted,
    /// Unrecognised type; passes so older engines accept newer configurations.
    Unknown(RawRule),
}

impl Condition {
    pub fn kind(&self) -> &str {
        match self {
            Condition::AssigneeRequired => "assignee_required",
            Condition::DescriptionRequired => "description_required",
            Condition::EstimatedTimeRequired => "estimated_time_required",
            Condition::SubtasksCompleted => "subtasks_completed",
            Condition::Unknown(raw) => &raw.kind,
        }
    }
}

impl From<RawRule> for Condition {
    fn from(raw: RawRule) -> Self {
        match raw.kind.as_str() {
            "assignee_required" => Condition::AssigneeRequired,
            "description_required" => Condition::DescriptionRequired,
            "estimated_time_required" => Condition::EstimatedTimeRequired,
            "subtasks_completed" => Condition::SubtasksCompleted,
            _ => Condition::Unknown(raw),
        }
    }
}

impl From<Condition> for RawRule {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::Unknown(raw) => raw,
            known => RawRule::new(known.kind()),
        }
    }
}

/// Required-field check: the named issue field must be non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValidator {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FieldValidator {
    pub fn new(field: &str) -> Self {
        FieldValidator {
            field: field.to_string(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn error_message(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("field {} is required", self.field))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRule", into = "RawRule")]
pub enum PostAction {
    AssignTo { user_id: i64 },
    SetField { field: String, value: Value },
    /// Reserved no-op.
    AddComment(Map<String, Value>),
    /// Reserved no-op.
    SendEmail(Map<String, Value>),
    /// Reserved no-op.
    Webhook(Map<String, Value>),
    Unknown(RawRule),
    Malformed { raw: RawRule, reason: String },
}

impl PostAction {
    pub fn kind(&self) -> &str {
        match self {
            PostAction::AssignTo { .. } => "assign_to",
            PostAction::SetField { .. } => "set_field",
            PostAction::AddComment(_) => "add_comment",
            PostAction::SendEmail(_) => "send_email",
            PostAction::Webhook(_) => "webhook",
            PostAction::Unknown(raw) => &raw.kind,
            PostAction::Malformed { raw, .. } => &raw.kind,
        }
    }

    pub fn assign_to(user_id: i64) -> Self {
        PostAction::AssignTo { user_id }
    }

    pub fn set_field(field: &str, value: Value) -> Self {
        PostAction::SetField {
            field: field.to_string(),
            value,
        }
    }
}

impl From<RawRule> for PostAction {
    fn from(raw: RawRule) -> Self {
        match raw.kind.as_str() {
            "assign_to" => match raw.params.get("user_id").and_then(Value::as_i64) {
                Some(user_id) => PostAction::AssignTo { user_id },
                None => PostAction::Malformed {
                    raw,
                    reason: "user_id must be an integer".to_string(),
                },
            },
            "set_field" => {
                let field = raw
                    .params
                    .get("field")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string);
                match field {
                    Some(field) => PostAction::SetField {
                        value: raw.params.get("value").cloned().unwrap_or(Value::Null),
                        field,
                    },
                    None => PostAction::Malformed {
                        raw,
                        reason: "field must be a non-empty string".to_string(),
                    },
                }
            }
            "add_comment" => PostAction::AddComment(raw.params),
            "send_email" => PostAction::SendEmail(raw.params),
            "webhook" => PostAction::Webhook(raw.params),
            _ => PostAction::Unknown(raw),
        }
    }
}

impl From<PostAction> for RawRule {
    fn from(action: PostAction) -> Self {
        match action {
            PostAction::AssignTo { user_id } => {
                RawRule::new("assign_to").with_param("user_id", Value::from(user_id))
            }
            PostAction::SetField { field, value } => RawRule::new("set_field")
                .with_param("field", Value::from(field))
                .with_param("value", value),
            PostAction::AddComment(params) => RawRule {
                kind: "add_comment".to_string(),
                params,
            },
            PostAction::SendEmail(params) => RawRule {
                kind: "send_email".to_string(),
                params,
            },
            PostAction::Webhook(params) => RawRule {
                kind: "webhook".to_string(),
                params,
            },
            PostAction::Unknown(raw) => raw,
            PostAction::Malformed { raw, .. } => raw,
        }
    }
}
