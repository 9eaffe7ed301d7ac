use crate::analysis::graph::GraphRules;
use crate::error::{Result, WorkflowError};
use crate::models::status::is_valid_status_key;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct EffectiveWorkflowSettings {
    pub busy_timeout_ms: u64,
    pub post_actions_enabled: bool,
    pub graph: GraphRules,
}

impl Default for EffectiveWorkflowSettings {
    fn default() -> Self {
        EffectiveWorkflowSettings {
            busy_timeout_ms: 5000,
            post_actions_enabled: true,
            graph: GraphRules::default(),
        }
    }
}

impl EffectiveWorkflowSettings {
    /// Typed view over an already-migrated settings document.
    pub fn from_value(settings: &Value) -> Self {
        let defaults = EffectiveWorkflowSettings::default();
        let string_or = |key: &str, fallback: &str| {
            settings
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };

        EffectiveWorkflowSettings {
            busy_timeout_ms: settings
                .get("busyTimeoutMs")
                .and_then(Value::as_u64)
                .unwrap_or(defaults.busy_timeout_ms),
            post_actions_enabled: settings
                .get("postActionsEnabled")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.post_actions_enabled),
            graph: GraphRules {
                min_status_count: settings
                    .get("minStatusCount")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .unwrap_or(defaults.graph.min_status_count),
                initial_status_key: string_or("initialStatusKey", &defaults.graph.initial_status_key),
                terminal_status_key: string_or("terminalStatusKey", &defaults.graph.terminal_status_key),
                warn_self_loops: settings
                    .get("warnSelfLoops")
                    .and_then(Value::as_bool)
                    .unwrap_or(defaults.graph.warn_self_loops),
            },
        }
    }
}

pub fn load_effective_settings(workspace_path: &str) -> Result<EffectiveWorkflowSettings> {
    let settings = load_settings_from_disk(workspace_path)?;
    Ok(EffectiveWorkflowSettings::from_value(&settings))
}

pub fn load_settings_from_disk(workspace_path: &str) -> Result<Value> {
    let path = settings_path(workspace_path);
    ensure_issueflow_dir(workspace_path)?;

    let original = if path.exists() {
        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("ignoring unreadable {}: {e}", path.display());
                json!({})
            }
        }
    } else {
        json!({})
    };

    let migrated = migrate_settings(original.clone());
    if migrated != original || !path.exists() {
        write_settings_file(&path, &migrated)?;
    }

    Ok(migrated)
}

/// Merge a partial settings document into the stored one and persist it.
pub fn save_settings_to_disk(workspace_path: &str, settings: Value) -> Result<Value> {
    if !settings.is_object() {
        return Err(WorkflowError::InvalidConfiguration(
            "settings must be a JSON object".to_string(),
        ));
    }

    let path = settings_path(workspace_path);
    ensure_issueflow_dir(workspace_path)?;

    let mut merged = load_settings_from_disk(workspace_path).unwrap_or_else(|_| default_settings());
    merge_settings(&mut merged, &settings);

    let migrated = migrate_settings(merged);
    write_settings_file(&path, &migrated)?;
    Ok(migrated)
}

fn settings_path(workspace_path: &str) -> PathBuf {
    Path::new(workspace_path)
        .join(".issueflow")
        .join("settings.json")
}

fn ensure_issueflow_dir(workspace_path: &str) -> Result<()> {
    let dir = Path::new(workspace_path).join(".issueflow");
    fs::create_dir_all(&dir)?;
    Ok(())
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<()> {
    let raw = serde_json::to_string_pretty(settings)?;
    fs::write(path, raw)?;
    Ok(())
}

fn migrate_settings(input: Value) -> Value {
    let defaults = default_settings();
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    deep_merge_defaults(&mut out, &defaults);
    sanitize_settings(&mut out);
    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    }

    out
}

fn default_settings() -> Value {
    json!({
        "schema_version": SETTINGS_SCHEMA_VERSION,
        "busyTimeoutMs": 5000,
        "minStatusCount": 3,
        "initialStatusKey": "TODO",
        "terminalStatusKey": "DONE",
        "postActionsEnabled": true,
        "warnSelfLoops": true
    })
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}

fn sanitize_settings(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    clamp_u64(obj, "busyTimeoutMs", 100, 60_000, 5000);
    clamp_u64(obj, "minStatusCount", 1, 20, 3);

    sanitize_status_key(obj, "initialStatusKey", "TODO");
    sanitize_status_key(obj, "terminalStatusKey", "DONE");

    ensure_bool(obj, "postActionsEnabled", true);
    ensure_bool(obj, "warnSelfLoops", true);
}

fn clamp_u64(map: &mut Map<String, Value>, key: &str, min: u64, max: u64, default: u64) {
    let raw = map.get(key).and_then(Value::as_u64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn sanitize_status_key(map: &mut Map<String, Value>, key: &str, default: &str) {
    let valid = map
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| is_valid_status_key(value))
        .unwrap_or(default)
        .to_string();
    map.insert(key.to_string(), json!(valid));
}

fn ensure_bool(map: &mut Map<String, Value>, key: &str, default: bool) {
    let value = map.get(key).and_then(Value::as_bool).unwrap_or(default);
    map.insert(key.to_string(), json!(value));
}
