use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The slice of an issue the workflow engine reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub assignee_id: Option<i64>,
    pub estimated_time: Option<f64>, // hours
    pub priority: Option<String>,
    pub status_id: i64,
    #[serde(default)]
    pub custom_fields: Map<String, Value>,
    pub version: i64,
    pub updated_at: i64,
}

impl Issue {
    /// Look up a field by name. Unknown names fall through to the custom fields.
    pub fn field_value(&self, field: &str) -> Value {
        match field {
            "title" => Value::from(self.title.clone()),
            "description" => Value::from(self.description.clone()),
            "assignee" | "assignee_id" => self.assignee_id.map(Value::from).unwrap_or(Value::Null),
            "estimated_time" | "estimate" => self
                .estimated_time
                .map(Value::from)
                .unwrap_or(Value::Null),
            "priority" => self.priority.clone().map(Value::from).unwrap_or(Value::Null),
            other => self.custom_fields.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    pub fn field_is_empty(&self, field: &str) -> bool {
        is_empty_value(&self.field_value(field))
    }

    /// Assign a field by name. Typed fields reject values of the wrong shape.
    pub fn set_field_value(&mut self, field: &str, value: Value) -> Result<(), String> {
        if value.is_null() {
            return Err("value must not be null".to_string());
        }

        match field {
            "id" | "project_id" | "status_id" | "status" | "version" | "updated_at" => {
                Err("field is managed by the workflow engine".to_string())
            }
            "title" => {
                self.title = expect_string(value)?;
                Ok(())
            }
            "description" => {
                self.description = expect_string(value)?;
                Ok(())
            }
            "priority" => {
                self.priority = Some(expect_string(value)?);
                Ok(())
            }
            "assignee" | "assignee_id" => {
                self.assignee_id = Some(value.as_i64().ok_or("expected an integer user id")?);
                Ok(())
            }
            "estimated_time" | "estimate" => {
                self.estimated_time = Some(value.as_f64().ok_or("expected a number of hours")?);
                Ok(())
            }
            other => {
                self.custom_fields.insert(other.to_string(), value);
                Ok(())
            }
        }
    }
}

fn expect_string(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(format!("expected a string, got {other}")),
    }
}

pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIssue {
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub assignee_id: Option<i64>,
    pub estimated_time: Option<f64>,
    pub priority: Option<String>,
    pub status_id: i64,
    #[serde(default)]
    pub custom_fields: Map<String, Value>,
}

impl NewIssue {
    pub fn new(project_id: i64, title: &str, status_id: i64) -> Self {
        NewIssue {
            project_id,
            title: title.to_string(),
            description: String::new(),
            assignee_id: None,
            estimated_time: None,
            priority: None,
            status_id,
            custom_fields: Map::new(),
        }
    }
}
