use crate::analysis::graph::{validate_graph, GraphRules, WorkflowValidation};
use crate::commands::db;
use crate::commands::settings::{load_effective_settings, EffectiveWorkflowSettings};
use crate::commands::transition::{self, AvailableTransition, TransitionOutcome};
use crate::error::Result;
use crate::models::actor::Actor;
use crate::models::history::TransitionHistory;
use crate::models::issue::Issue;
use crate::models::status::{NewStatus, Status, StatusCategory};
use crate::models::transition::NewTransition;
use rusqlite::{Connection, TransactionBehavior};

const DEFAULT_STATUSES: [(&str, &str, StatusCategory); 3] = [
    ("TODO", "To Do", StatusCategory::Todo),
    ("IN_PROGRESS", "In Progress", StatusCategory::InProgress),
    ("DONE", "Done", StatusCategory::Done),
];

// (from key, to key, name)
const DEFAULT_TRANSITIONS: [(&str, &str, &str); 4] = [
    ("TODO", "IN_PROGRESS", "Start Progress"),
    ("IN_PROGRESS", "TODO", "Stop Progress"),
    ("IN_PROGRESS", "DONE", "Resolve"),
    ("DONE", "TODO", "Reopen"),
];

/// Seed the default workflow for a new project.
///
/// Creates the global TODO / IN_PROGRESS / DONE statuses if they are missing
/// and the project's default transitions between them. Safe to call again:
/// anything that already exists is left alone.
pub fn bootstrap_default_workflow(conn: &mut Connection, project_id: i64) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut created = 0;

    let mut statuses: Vec<Status> = Vec::with_capacity(DEFAULT_STATUSES.len());
    for (key, name, category) in DEFAULT_STATUSES {
        let status = match db::find_status_by_key(&tx, None, key)? {
            Some(existing) => existing,
            None => {
                created += 1;
                db::create_status(
                    &tx,
                    &NewStatus {
                        key: key.to_string(),
                        name: name.to_string(),
                        category,
                        project_id: None,
                    },
                )?
            }
        };
        statuses.push(status);
    }

    let id_of = |key: &str| statuses.iter().find(|s| s.key == key).map(|s| s.id);
    let existing = db::list_transitions(&tx, project_id)?;

    for (from, to, name) in DEFAULT_TRANSITIONS {
        let (Some(from_id), Some(to_id)) = (id_of(from), id_of(to)) else {
            continue;
        };
        let present = existing
            .iter()
            .any(|t| t.from_status_id == from_id && t.to_status_id == to_id && t.name == name);
        if !present {
            db::create_transition(&tx, &NewTransition::new(project_id, from_id, to_id, name))?;
            created += 1;
        }
    }

    tx.commit()?;
    log::debug!("bootstrapped workflow for project {project_id}: {created} new record(s)");
    Ok(())
}

/// Structural check of a project's graph. Never fails; load errors are
/// reported inside the result.
pub fn validate_workflow(conn: &Connection, project_id: i64, rules: &GraphRules) -> WorkflowValidation {
    let loaded = db::list_statuses(conn, project_id)
        .and_then(|statuses| Ok((statuses, db::list_transitions(conn, project_id)?)));

    match loaded {
        Ok((statuses, transitions)) => validate_graph(&statuses, &transitions, rules),
        Err(e) => WorkflowValidation {
            valid: false,
            errors: vec![format!("failed to load workflow for project {project_id}: {e}")],
            warnings: Vec::new(),
        },
    }
}

/// A workflow database together with the settings it runs under.
pub struct Workflow {
    conn: Connection,
    settings: EffectiveWorkflowSettings,
}

impl Workflow {
    /// Open the workspace database using the workspace settings file.
    pub fn open(workspace_path: &str) -> Result<Self> {
        let settings = load_effective_settings(workspace_path)?;
        let conn = db::get_db_connection(workspace_path, settings.busy_timeout_ms)?;
        Ok(Workflow { conn, settings })
    }

    pub fn from_connection(conn: Connection, settings: EffectiveWorkflowSettings) -> Result<Self> {
        db::initialize_schema(&conn)?;
        Ok(Workflow { conn, settings })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn settings(&self) -> &EffectiveWorkflowSettings {
        &self.settings
    }

    pub fn bootstrap(&mut self, project_id: i64) -> Result<()> {
        bootstrap_default_workflow(&mut self.conn, project_id)
    }

    pub fn perform(&mut self, actor: &Actor, issue: &Issue, transition_id: i64) -> Result<Issue> {
        self.perform_detailed(actor, issue, transition_id)
            .map(|outcome| outcome.issue)
    }

    pub fn perform_detailed(&mut self, actor: &Actor, issue: &Issue, transition_id: i64) -> Result<TransitionOutcome> {
        let run_post_actions = self.settings.post_actions_enabled;
        transition::perform_detailed(&mut self.conn, actor, issue, transition_id, run_post_actions)
    }

    pub fn available_transitions(&self, actor: &Actor, issue: &Issue) -> Result<Vec<AvailableTransition>> {
        transition::available_transitions(&self.conn, actor, issue)
    }

    pub fn history(&self, issue_id: i64) -> Result<Vec<TransitionHistory>> {
        transition::issue_history(&self.conn, issue_id)
    }

    pub fn validate(&self, project_id: i64) -> WorkflowValidation {
        validate_workflow(&self.conn, project_id, &self.settings.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        db::initialize_schema(&conn).expect("schema init");
        conn
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let mut conn = memory_db();
        bootstrap_default_workflow(&mut conn, 1).unwrap();
        bootstrap_default_workflow(&mut conn, 1).unwrap();

        assert_eq!(db::list_statuses(&conn, 1).unwrap().len(), 3);
        assert_eq!(db::list_transitions(&conn, 1).unwrap().len(), 4);
    }

    #[test]
    fn second_project_reuses_global_statuses() {
        let mut conn = memory_db();
        bootstrap_default_workflow(&mut conn, 1).unwrap();
        bootstrap_default_workflow(&mut conn, 2).unwrap();

        let global_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM statuses WHERE project_id IS NULL", [], |r| r.get(0))
            .unwrap();
        assert_eq!(global_count, 3);
        assert_eq!(db::list_transitions(&conn, 2).unwrap().len(), 4);
    }

    #[test]
    fn default_workflow_is_valid_with_reopen_loop_warning() {
        let mut conn = memory_db();
        bootstrap_default_workflow(&mut conn, 1).unwrap();

        let result = validate_workflow(&conn, 1, &GraphRules::default());

        assert!(result.valid, "unexpected errors: {:?}", result.errors);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("In Progress <-> To Do"));
        assert!(result.warnings[0].contains("Done <-> To Do"));
    }

    #[test]
    fn project_workflow_is_judged_apart_from_bootstrapped_globals() {
        let mut conn = memory_db();
        bootstrap_default_workflow(&mut conn, 1).unwrap();

        let own = |key: &str, category| {
            db::create_status(
                &conn,
                &NewStatus {
                    key: key.to_string(),
                    name: key.to_string(),
                    category,
                    project_id: Some(2),
                },
            )
            .unwrap()
        };
        let todo = own("TODO", StatusCategory::Todo);
        let review = own("REVIEW", StatusCategory::InProgress);
        let done = own("DONE", StatusCategory::Done);
        db::create_transition(&conn, &NewTransition::new(2, todo.id, review.id, "Submit")).unwrap();
        db::create_transition(&conn, &NewTransition::new(2, review.id, done.id, "Approve")).unwrap();

        let result = validate_workflow(&conn, 2, &GraphRules::default());

        assert!(result.valid, "unexpected errors: {:?}", result.errors);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn unmigrated_database_reports_instead_of_failing() {
        let conn = Connection::open_in_memory().unwrap();
        let result = validate_workflow(&conn, 1, &GraphRules::default());
        assert!(!result.valid);
        assert!(result.errors[0].contains("failed to load workflow"));
    }
}
