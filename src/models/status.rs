use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Todo,
    InProgress,
    Done,
}

impl StatusCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Todo => "todo",
            StatusCategory::InProgress => "in_progress",
            StatusCategory::Done => "done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "todo" => Some(StatusCategory::Todo),
            "in_progress" => Some(StatusCategory::InProgress),
            "done" => Some(StatusCategory::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: i64,
    pub key: String, // uppercase token, e.g. "IN_PROGRESS"
    pub name: String,
    pub category: StatusCategory,
    pub project_id: Option<i64>, // None => shared by every project
}

impl Status {
    pub fn is_global(&self) -> bool {
        self.project_id.is_none()
    }

    /// Whether an issue or transition in `project_id` may reference this status.
    pub fn visible_to(&self, project_id: i64) -> bool {
        self.project_id.map_or(true, |owner| owner == project_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStatus {
    pub key: String,
    pub name: String,
    pub category: StatusCategory,
    pub project_id: Option<i64>,
}

/// Machine keys are uppercase tokens: a leading letter, then letters, digits or underscores.
pub fn is_valid_status_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    }
}
