//! Side effects declared on a transition, run after its status change commits.
//!
//! Every action is applied and saved on its own. A failing action is logged
//! and reported, and the remaining actions still run; nothing here can undo
//! the transition itself.

use crate::commands::db;
use crate::error::PostActionError;
use crate::models::actor::Actor;
use crate::models::issue::Issue;
use crate::models::rules::PostAction;
use crate::models::transition::Transition;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PostActionOutcome {
    Applied,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostActionReport {
    pub action: String,
    #[serde(flatten)]
    pub outcome: PostActionOutcome,
}

impl PostActionReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, PostActionOutcome::Failed { .. })
    }
}

enum Effect {
    Changed,
    Skipped(String),
}

/// Run `transition`'s post-actions against the committed `issue`.
///
/// Returns the issue as it stands after the successful actions, plus one
/// report per declared action in declaration order. Never fails.
pub fn dispatch(
    conn: &Connection,
    issue: &Issue,
    transition: &Transition,
    actor: &Actor,
) -> (Issue, Vec<PostActionReport>) {
    let mut current = issue.clone();
    let mut reports = Vec::with_capacity(transition.rules.post_actions.len());

    for action in &transition.rules.post_actions {
        let mut candidate = current.clone();
        let result = apply_action(action, &mut candidate).and_then(|effect| match effect {
            Effect::Changed => {
                let saved = db::save_issue(conn, &candidate)?;
                current = saved;
                Ok(PostActionOutcome::Applied)
            }
            Effect::Skipped(reason) => Ok(PostActionOutcome::Skipped { reason }),
        });

        let outcome = result.unwrap_or_else(|err| {
            log::warn!(
                "post-action '{}' failed for issue {} after transition {} by user {}: {err}",
                action.kind(),
                issue.id,
                transition.id,
                actor.id
            );
            PostActionOutcome::Failed {
                error: err.to_string(),
            }
        });

        reports.push(PostActionReport {
            action: action.kind().to_string(),
            outcome,
        });
    }

    (current, reports)
}

fn apply_action(action: &PostAction, issue: &mut Issue) -> Result<Effect, PostActionError> {
    match action {
        PostAction::AssignTo { user_id } => {
            issue.assignee_id = Some(*user_id);
            Ok(Effect::Changed)
        }
        PostAction::SetField { field, value } => {
            issue
                .set_field_value(field, value.clone())
                .map_err(|reason| PostActionError::InvalidField {
                    field: field.clone(),
                    reason,
                })?;
            Ok(Effect::Changed)
        }
        PostAction::AddComment(_) | PostAction::SendEmail(_) | PostAction::Webhook(_) => {
            log::debug!(
                "post-action '{}' on issue {} is reserved and has no effect",
                action.kind(),
                issue.id
            );
            Ok(Effect::Skipped("not implemented".to_string()))
        }
        PostAction::Unknown(raw) => {
            log::warn!(
                "skipping unknown post-action type '{}' on issue {}",
                raw.kind,
                issue.id
            );
            Ok(Effect::Skipped(format!("unknown action type '{}'", raw.kind)))
        }
        PostAction::Malformed { raw, reason } => Err(PostActionError::Malformed {
            kind: raw.kind.clone(),
            reason: reason.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::db::{create_issue, create_status, find_issue, initialize_schema};
    use crate::models::issue::NewIssue;
    use crate::models::rules::RawRule;
    use crate::models::status::{NewStatus, StatusCategory};
    use crate::models::transition::TransitionRules;
    use serde_json::{json, Value};

    fn setup() -> (Connection, Issue) {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("schema init");
        let todo = create_status(
            &conn,
            &NewStatus {
                key: "TODO".to_string(),
                name: "To Do".to_string(),
                category: StatusCategory::Todo,
                project_id: None,
            },
        )
        .unwrap();
        let issue = create_issue(&conn, &NewIssue::new(1, "Export fails", todo.id)).unwrap();
        (conn, issue)
    }

    fn transition_with(post_actions: Vec<PostAction>) -> Transition {
        Transition {
            id: 77,
            project_id: 1,
            from_status_id: 1,
            to_status_id: 1,
            name: "Triage".to_string(),
            description: None,
            rules: TransitionRules {
                post_actions,
                ..Default::default()
            },
        }
    }

    #[test]
    fn failing_action_does_not_block_later_actions() {
        let (conn, issue) = setup();
        let transition = transition_with(vec![
            PostAction::from(RawRule::new("assign_to").with_param("user_id", json!("nobody"))),
            PostAction::set_field("priority", Value::Null),
            PostAction::assign_to(12),
            PostAction::set_field("priority", json!("high")),
        ]);

        let (updated, reports) = dispatch(&conn, &issue, &transition, &Actor::new(1, "admin"));

        assert_eq!(reports.len(), 4);
        assert!(reports[0].is_failure());
        assert!(reports[1].is_failure());
        assert_eq!(reports[2].outcome, PostActionOutcome::Applied);
        assert_eq!(reports[3].outcome, PostActionOutcome::Applied);
        assert_eq!(updated.assignee_id, Some(12));

        let stored = find_issue(&conn, issue.id).unwrap().unwrap();
        assert_eq!(stored.assignee_id, Some(12));
        assert_eq!(stored.priority.as_deref(), Some("high"));
        assert_eq!(stored.version, issue.version + 2);
    }

    #[test]
    fn reserved_and_unknown_actions_are_skipped() {
        let (conn, issue) = setup();
        let transition = transition_with(vec![
            PostAction::from(RawRule::new("add_comment").with_param("body", json!("Closed"))),
            PostAction::from(RawRule::new("send_email")),
            PostAction::from(RawRule::new("webhook").with_param("url", json!("https://hooks.invalid"))),
            PostAction::from(RawRule::new("escalate")),
        ]);

        let (updated, reports) = dispatch(&conn, &issue, &transition, &Actor::new(1, "admin"));

        assert!(reports
            .iter()
            .all(|r| matches!(r.outcome, PostActionOutcome::Skipped { .. })));
        assert_eq!(reports[3].action, "escalate");
        assert_eq!(updated, issue);
    }

    #[test]
    fn store_conflicts_are_reported_as_failures() {
        let (conn, issue) = setup();
        let mut moved_on = issue.clone();
        moved_on.title = "Export fails on large files".to_string();
        db::save_issue(&conn, &moved_on).unwrap();

        let transition = transition_with(vec![PostAction::assign_to(3)]);
        let (_, reports) = dispatch(&conn, &issue, &transition, &Actor::new(1, "admin"));

        assert!(reports[0].is_failure());
    }
}
