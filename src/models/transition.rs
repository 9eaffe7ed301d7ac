use crate::models::rules::{Condition, FieldValidator, PostAction};
use serde::{Deserialize, Serialize};

/// Rule sets attached to a transition. All four are independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionRules {
    #[serde(default)]
    pub allowed_roles: Vec<String>, // empty => anyone may fire the transition
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub validators: Vec<FieldValidator>,
    #[serde(default)]
    pub post_actions: Vec<PostAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: i64,
    pub project_id: i64,
    pub from_status_id: i64,
    pub to_status_id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub rules: TransitionRules,
}

impl Transition {
    pub fn is_self_loop(&self) -> bool {
        self.from_status_id == self.to_status_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransition {
    pub project_id: i64,
    pub from_status_id: i64,
    pub to_status_id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub rules: TransitionRules,
}

impl NewTransition {
    pub fn new(project_id: i64, from_status_id: i64, to_status_id: i64, name: &str) -> Self {
        NewTransition {
            project_id,
            from_status_id,
            to_status_id,
            name: name.to_string(),
            description: None,
            rules: TransitionRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: TransitionRules) -> Self {
        self.rules = rules;
        self
    }
}
