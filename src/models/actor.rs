use serde::{Deserialize, Serialize};

/// Caller identity supplied by the surrounding service. Already authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub role: String,
}

impl Actor {
    pub fn new(id: i64, role: &str) -> Self {
        Actor {
            id,
            role: role.to_string(),
        }
    }
}
