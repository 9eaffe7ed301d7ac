use crate::error::{Result, WorkflowError};
use crate::models::history::{NewHistoryRecord, TransitionHistory};
use crate::models::issue::{Issue, NewIssue};
use crate::models::status::{is_valid_status_key, NewStatus, Status, StatusCategory};
use crate::models::transition::{NewTransition, Transition, TransitionRules};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

const DB_SCHEMA_VERSION: i64 = 1;

const STATUS_COLUMNS: &str = "id, key, name, category, project_id";
const TRANSITION_COLUMNS: &str = "id, project_id, from_status_id, to_status_id, name, description, allowed_roles_json, conditions_json, validators_json, post_actions_json";
const ISSUE_COLUMNS: &str = "id, project_id, title, description, assignee_id, estimated_time, priority, status_id, custom_fields_json, version, updated_at";
const HISTORY_COLUMNS: &str = "id, issue_id, transition_id, from_status_id, to_status_id, actor_id, validation_json, post_actions_json, created_at";

pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        log::warn!("workflow database schema v{version} is newer than v{DB_SCHEMA_VERSION}");
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS statuses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL CHECK(category IN ('todo', 'in_progress', 'done')),
            project_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS transitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            from_status_id INTEGER NOT NULL REFERENCES statuses(id) ON DELETE CASCADE,
            to_status_id INTEGER NOT NULL REFERENCES statuses(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            allowed_roles_json TEXT NOT NULL DEFAULT '[]',
            conditions_json TEXT NOT NULL DEFAULT '[]',
            validators_json TEXT NOT NULL DEFAULT '[]',
            post_actions_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE (project_id, from_status_id, to_status_id, name)
        );

        CREATE TABLE IF NOT EXISTS issues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            assignee_id INTEGER,
            estimated_time REAL,
            priority TEXT,
            status_id INTEGER NOT NULL REFERENCES statuses(id),
            custom_fields_json TEXT NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS transition_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            issue_id INTEGER NOT NULL,
            transition_id INTEGER REFERENCES transitions(id) ON DELETE SET NULL,
            from_status_id INTEGER NOT NULL,
            to_status_id INTEGER NOT NULL,
            actor_id INTEGER NOT NULL,
            validation_json TEXT NOT NULL DEFAULT '{}',
            post_actions_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_statuses_global_key ON statuses(key) WHERE project_id IS NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_statuses_project_key ON statuses(project_id, key) WHERE project_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_transitions_project ON transitions(project_id, from_status_id);
        CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status_id);
        CREATE INDEX IF NOT EXISTS idx_history_issue ON transition_history(issue_id, created_at);
        ",
    )
}

/// Open (creating if needed) the workflow database of a workspace.
pub fn get_db_connection(workspace_path: &str, busy_timeout_ms: u64) -> Result<Connection> {
    let dir = Path::new(workspace_path).join(".issueflow");
    std::fs::create_dir_all(&dir)?;
    let conn = Connection::open(dir.join("workflow.db"))?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    initialize_schema(&conn)?;
    Ok(conn)
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ---- statuses ----

fn status_from_row(row: &Row) -> rusqlite::Result<Status> {
    let category: String = row.get(3)?;
    let category = StatusCategory::parse(&category).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown status category '{category}'").into(),
        )
    })?;

    Ok(Status {
        id: row.get(0)?,
        key: row.get(1)?,
        name: row.get(2)?,
        category,
        project_id: row.get(4)?,
    })
}

pub fn create_status(conn: &Connection, status: &NewStatus) -> Result<Status> {
    if !is_valid_status_key(&status.key) {
        return Err(WorkflowError::InvalidConfiguration(format!(
            "status key '{}' must be an uppercase token",
            status.key
        )));
    }
    if status.name.trim().is_empty() {
        return Err(WorkflowError::InvalidConfiguration(
            "status name must not be empty".to_string(),
        ));
    }
    if find_status_by_key(conn, status.project_id, &status.key)?.is_some() {
        return Err(WorkflowError::InvalidConfiguration(format!(
            "status key '{}' already exists in this scope",
            status.key
        )));
    }

    conn.execute(
        "INSERT INTO statuses (key, name, category, project_id) VALUES (?1, ?2, ?3, ?4)",
        params![&status.key, &status.name, status.category.as_str(), status.project_id],
    )?;

    Ok(Status {
        id: conn.last_insert_rowid(),
        key: status.key.clone(),
        name: status.name.clone(),
        category: status.category,
        project_id: status.project_id,
    })
}

pub fn find_status(conn: &Connection, id: i64) -> Result<Option<Status>> {
    let status = conn
        .query_row(
            &format!("SELECT {STATUS_COLUMNS} FROM statuses WHERE id = ?1"),
            params![id],
            status_from_row,
        )
        .optional()?;
    Ok(status)
}

/// Exact-scope lookup: `project_id = None` only matches global statuses.
pub fn find_status_by_key(conn: &Connection, project_id: Option<i64>, key: &str) -> Result<Option<Status>> {
    let status = conn
        .query_row(
            &format!("SELECT {STATUS_COLUMNS} FROM statuses WHERE key = ?1 AND project_id IS ?2"),
            params![key, project_id],
            status_from_row,
        )
        .optional()?;
    Ok(status)
}

/// Statuses visible to a project: its own plus the global ones.
pub fn list_statuses(conn: &Connection, project_id: i64) -> Result<Vec<Status>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STATUS_COLUMNS} FROM statuses WHERE project_id IS NULL OR project_id = ?1 ORDER BY id ASC"
    ))?;
    let statuses = stmt
        .query_map(params![project_id], status_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(statuses)
}

/// Delete a status nobody uses. Transitions touching it go with it.
pub fn delete_status(conn: &Connection, id: i64) -> Result<()> {
    let issue_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM issues WHERE status_id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    if issue_count > 0 {
        return Err(WorkflowError::StatusInUse {
            status_id: id,
            issue_count,
        });
    }

    let deleted = conn.execute("DELETE FROM statuses WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(WorkflowError::not_found("status", id));
    }
    Ok(())
}

// ---- transitions ----

fn transition_from_row(row: &Row) -> rusqlite::Result<Transition> {
    Ok(Transition {
        id: row.get(0)?,
        project_id: row.get(1)?,
        from_status_id: row.get(2)?,
        to_status_id: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        rules: TransitionRules {
            allowed_roles: json_column(row, 6)?,
            conditions: json_column(row, 7)?,
            validators: json_column(row, 8)?,
            post_actions: json_column(row, 9)?,
        },
    })
}

fn endpoint(conn: &Connection, status_id: i64, project_id: i64) -> Result<Status> {
    let status = find_status(conn, status_id)?.ok_or(WorkflowError::not_found("status", status_id))?;
    match status.project_id {
        Some(owner) if owner != project_id => Err(WorkflowError::ProjectMismatch {
            entity: "status",
            id: status_id,
            owner_project: owner,
            expected_project: project_id,
        }),
        _ => Ok(status),
    }
}

pub fn create_transition(conn: &Connection, transition: &NewTransition) -> Result<Transition> {
    if transition.name.trim().is_empty() {
        return Err(WorkflowError::InvalidConfiguration(
            "transition name must not be empty".to_string(),
        ));
    }
    endpoint(conn, transition.from_status_id, transition.project_id)?;
    endpoint(conn, transition.to_status_id, transition.project_id)?;

    let duplicate: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM transitions WHERE project_id = ?1 AND from_status_id = ?2 AND to_status_id = ?3 AND name = ?4)",
        params![
            transition.project_id,
            transition.from_status_id,
            transition.to_status_id,
            &transition.name
        ],
        |r| r.get(0),
    )?;
    if duplicate {
        return Err(WorkflowError::InvalidConfiguration(format!(
            "transition '{}' already exists between these statuses",
            transition.name
        )));
    }

    let rules = &transition.rules;
    conn.execute(
        "INSERT INTO transitions (project_id, from_status_id, to_status_id, name, description, allowed_roles_json, conditions_json, validators_json, post_actions_json) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            transition.project_id,
            transition.from_status_id,
            transition.to_status_id,
            &transition.name,
            transition.description.as_deref(),
            serde_json::to_string(&rules.allowed_roles)?,
            serde_json::to_string(&rules.conditions)?,
            serde_json::to_string(&rules.validators)?,
            serde_json::to_string(&rules.post_actions)?,
        ],
    )?;

    Ok(Transition {
        id: conn.last_insert_rowid(),
        project_id: transition.project_id,
        from_status_id: transition.from_status_id,
        to_status_id: transition.to_status_id,
        name: transition.name.clone(),
        description: transition.description.clone(),
        rules: rules.clone(),
    })
}

pub fn update_transition_rules(conn: &Connection, id: i64, rules: &TransitionRules) -> Result<Transition> {
    let updated = conn.execute(
        "UPDATE transitions SET allowed_roles_json=?2, conditions_json=?3, validators_json=?4, post_actions_json=?5 WHERE id=?1",
        params![
            id,
            serde_json::to_string(&rules.allowed_roles)?,
            serde_json::to_string(&rules.conditions)?,
            serde_json::to_string(&rules.validators)?,
            serde_json::to_string(&rules.post_actions)?,
        ],
    )?;
    if updated == 0 {
        return Err(WorkflowError::not_found("transition", id));
    }
    find_transition(conn, id)?.ok_or(WorkflowError::not_found("transition", id))
}

pub fn find_transition(conn: &Connection, id: i64) -> Result<Option<Transition>> {
    let transition = conn
        .query_row(
            &format!("SELECT {TRANSITION_COLUMNS} FROM transitions WHERE id = ?1"),
            params![id],
            transition_from_row,
        )
        .optional()?;
    Ok(transition)
}

pub fn list_transitions(conn: &Connection, project_id: i64) -> Result<Vec<Transition>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSITION_COLUMNS} FROM transitions WHERE project_id = ?1 ORDER BY id ASC"
    ))?;
    let transitions = stmt
        .query_map(params![project_id], transition_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(transitions)
}

pub fn delete_transition(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn.execute("DELETE FROM transitions WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(WorkflowError::not_found("transition", id));
    }
    Ok(())
}

// ---- issues ----

fn issue_from_row(row: &Row) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        assignee_id: row.get(4)?,
        estimated_time: row.get(5)?,
        priority: row.get(6)?,
        status_id: row.get(7)?,
        custom_fields: json_column(row, 8)?,
        version: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn create_issue(conn: &Connection, issue: &NewIssue) -> Result<Issue> {
    endpoint(conn, issue.status_id, issue.project_id)?;
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO issues (project_id, title, description, assignee_id, estimated_time, priority, status_id, custom_fields_json, version, updated_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,0,?9)",
        params![
            issue.project_id,
            &issue.title,
            &issue.description,
            issue.assignee_id,
            issue.estimated_time,
            issue.priority.as_deref(),
            issue.status_id,
            serde_json::to_string(&issue.custom_fields)?,
            now,
        ],
    )?;

    Ok(Issue {
        id: conn.last_insert_rowid(),
        project_id: issue.project_id,
        title: issue.title.clone(),
        description: issue.description.clone(),
        assignee_id: issue.assignee_id,
        estimated_time: issue.estimated_time,
        priority: issue.priority.clone(),
        status_id: issue.status_id,
        custom_fields: issue.custom_fields.clone(),
        version: 0,
        updated_at: now,
    })
}

pub fn find_issue(conn: &Connection, id: i64) -> Result<Option<Issue>> {
    let issue = conn
        .query_row(
            &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1"),
            params![id],
            issue_from_row,
        )
        .optional()?;
    Ok(issue)
}

/// Write back an issue read at `issue.version`. Fails with `Conflict` if
/// someone else saved it in between. Returns the stored copy.
pub fn save_issue(conn: &Connection, issue: &Issue) -> Result<Issue> {
    let now = chrono::Utc::now().timestamp();
    let updated = conn.execute(
        "UPDATE issues SET title=?3, description=?4, assignee_id=?5, estimated_time=?6, priority=?7, status_id=?8, custom_fields_json=?9, version=version+1, updated_at=?10 WHERE id=?1 AND version=?2",
        params![
            issue.id,
            issue.version,
            &issue.title,
            &issue.description,
            issue.assignee_id,
            issue.estimated_time,
            issue.priority.as_deref(),
            issue.status_id,
            serde_json::to_string(&issue.custom_fields)?,
            now,
        ],
    )?;

    if updated == 0 {
        return match find_issue(conn, issue.id)? {
            Some(_) => Err(WorkflowError::Conflict {
                issue_id: issue.id,
                expected: issue.version,
            }),
            None => Err(WorkflowError::not_found("issue", issue.id)),
        };
    }

    Ok(Issue {
        version: issue.version + 1,
        updated_at: now,
        ..issue.clone()
    })
}

// ---- history ----

fn history_from_row(row: &Row) -> rusqlite::Result<TransitionHistory> {
    Ok(TransitionHistory {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        transition_id: row.get(2)?,
        from_status_id: row.get(3)?,
        to_status_id: row.get(4)?,
        actor_id: row.get(5)?,
        validation: json_column(row, 6)?,
        post_actions: json_column(row, 7)?,
        created_at: row.get(8)?,
    })
}

pub fn insert_history(conn: &Connection, record: &NewHistoryRecord) -> Result<TransitionHistory> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO transition_history (issue_id, transition_id, from_status_id, to_status_id, actor_id, validation_json, post_actions_json, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            record.issue_id,
            record.transition_id,
            record.from_status_id,
            record.to_status_id,
            record.actor_id,
            serde_json::to_string(&record.validation)?,
            serde_json::to_string(&record.post_actions)?,
            now,
        ],
    )?;

    Ok(TransitionHistory {
        id: conn.last_insert_rowid(),
        issue_id: record.issue_id,
        transition_id: Some(record.transition_id),
        from_status_id: record.from_status_id,
        to_status_id: record.to_status_id,
        actor_id: record.actor_id,
        validation: record.validation.clone(),
        post_actions: record.post_actions.clone(),
        created_at: now,
    })
}

pub fn list_history(conn: &Connection, issue_id: i64) -> Result<Vec<TransitionHistory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HISTORY_COLUMNS} FROM transition_history WHERE issue_id = ?1 ORDER BY created_at ASC, id ASC"
    ))?;
    let records = stmt
        .query_map(params![issue_id], history_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rules::{Condition, FieldValidator, PostAction};
    use serde_json::json;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("schema init");
        conn
    }

    fn status(conn: &Connection, key: &str, project_id: Option<i64>) -> Status {
        create_status(
            conn,
            &NewStatus {
                key: key.to_string(),
                name: key.to_lowercase(),
                category: StatusCategory::Todo,
                project_id,
            },
        )
        .expect("create status")
    }

    #[test]
    fn schema_initializes_with_expected_version() {
        let conn = memory_db();
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("schema version");
        assert_eq!(version, DB_SCHEMA_VERSION);

        initialize_schema(&conn).expect("re-running migrations is a no-op");
    }

    #[test]
    fn status_keys_are_unique_per_scope() {
        let conn = memory_db();
        status(&conn, "TODO", None);
        status(&conn, "TODO", Some(1));
        status(&conn, "TODO", Some(2));

        let err = create_status(
            &conn,
            &NewStatus {
                key: "TODO".to_string(),
                name: "Again".to_string(),
                category: StatusCategory::Todo,
                project_id: Some(1),
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIGURATION");

        assert_eq!(list_statuses(&conn, 1).unwrap().len(), 2);
        assert_eq!(list_statuses(&conn, 3).unwrap().len(), 1);
    }

    #[test]
    fn transition_rules_survive_a_round_trip_through_json_columns() {
        let conn = memory_db();
        let from = status(&conn, "TODO", None);
        let to = status(&conn, "DONE", None);

        let rules = TransitionRules {
            allowed_roles: vec!["admin".to_string()],
            conditions: vec![Condition::AssigneeRequired],
            validators: vec![FieldValidator::new("description").with_message("Say why")],
            post_actions: vec![
                PostAction::assign_to(4),
                PostAction::set_field("resolution", json!("fixed")),
            ],
        };
        let created = create_transition(
            &conn,
            &NewTransition::new(1, from.id, to.id, "Resolve").with_rules(rules.clone()),
        )
        .expect("create transition");

        let loaded = find_transition(&conn, created.id).unwrap().expect("transition exists");
        assert_eq!(loaded, created);
        assert_eq!(loaded.rules, rules);
    }

    #[test]
    fn transitions_cannot_use_another_projects_status() {
        let conn = memory_db();
        let global = status(&conn, "TODO", None);
        let foreign = status(&conn, "QA", Some(2));

        let err = create_transition(&conn, &NewTransition::new(1, global.id, foreign.id, "Test"))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::ProjectMismatch {
                entity: "status",
                owner_project: 2,
                expected_project: 1,
                ..
            }
        ));
        assert_eq!(err.code(), "PROJECT_MISMATCH");
        assert!(list_transitions(&conn, 1).unwrap().is_empty());

        let err = create_transition(&conn, &NewTransition::new(1, global.id, 999, "Test"))
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn parallel_transitions_need_distinct_names() {
        let conn = memory_db();
        let a = status(&conn, "TODO", None);
        let b = status(&conn, "DONE", None);

        create_transition(&conn, &NewTransition::new(1, a.id, b.id, "Close")).unwrap();
        create_transition(&conn, &NewTransition::new(1, a.id, b.id, "Won't fix")).unwrap();
        let err = create_transition(&conn, &NewTransition::new(1, a.id, b.id, "Close")).unwrap_err();

        assert_eq!(err.code(), "INVALID_CONFIGURATION");
        assert_eq!(list_transitions(&conn, 1).unwrap().len(), 2);
    }

    #[test]
    fn deleting_a_status_cascades_to_its_transitions_but_not_if_in_use() {
        let conn = memory_db();
        let a = status(&conn, "TODO", Some(1));
        let b = status(&conn, "REVIEW", Some(1));
        create_transition(&conn, &NewTransition::new(1, a.id, b.id, "Review")).unwrap();
        create_issue(&conn, &NewIssue::new(1, "Typo", a.id)).unwrap();

        let err = delete_status(&conn, a.id).unwrap_err();
        assert!(matches!(err, WorkflowError::StatusInUse { issue_count: 1, .. }));

        delete_status(&conn, b.id).expect("unused status deletes");
        assert!(list_transitions(&conn, 1).unwrap().is_empty());
    }

    #[test]
    fn save_issue_rejects_stale_versions() {
        let conn = memory_db();
        let todo = status(&conn, "TODO", None);
        let issue = create_issue(&conn, &NewIssue::new(1, "Flaky test", todo.id)).unwrap();

        let mut first = issue.clone();
        first.priority = Some("high".to_string());
        let saved = save_issue(&conn, &first).expect("first save");
        assert_eq!(saved.version, 1);

        let mut stale = issue;
        stale.title = "Flaky test (renamed)".to_string();
        let err = save_issue(&conn, &stale).unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict { expected: 0, .. }));

        let stored = find_issue(&conn, saved.id).unwrap().unwrap();
        assert_eq!(stored.title, "Flaky test");
        assert_eq!(stored.priority.as_deref(), Some("high"));
    }
}
