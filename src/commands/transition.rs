use crate::analysis::rules::evaluate;
use crate::commands::db;
use crate::commands::post_actions::{self, PostActionReport};
use crate::error::{Result, WorkflowError};
use crate::models::actor::Actor;
use crate::models::history::{NewHistoryRecord, TransitionEvaluation, TransitionHistory};
use crate::models::issue::Issue;
use crate::models::transition::Transition;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub issue: Issue,
    pub history: TransitionHistory,
    pub post_actions: Vec<PostActionReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableTransition {
    pub transition: Transition,
    pub evaluation: TransitionEvaluation,
}

/// Move `issue` along `transition_id` and return the updated issue.
pub fn perform(conn: &mut Connection, actor: &Actor, issue: &Issue, transition_id: i64) -> Result<Issue> {
    perform_detailed(conn, actor, issue, transition_id, true).map(|outcome| outcome.issue)
}

/// Apply a transition and report what happened.
///
/// The issue is re-read inside an immediate transaction, so the write lock is
/// held from the precondition checks until commit; a concurrent caller that
/// already moved the issue makes this one fail with `InvalidSourceState`.
/// The status change and its history record commit together or not at all.
/// Post-actions run afterwards on the committed issue and cannot fail the call.
pub fn perform_detailed(
    conn: &mut Connection,
    actor: &Actor,
    issue: &Issue,
    transition_id: i64,
    run_post_actions: bool,
) -> Result<TransitionOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let transition = db::find_transition(&tx, transition_id)?
        .ok_or(WorkflowError::not_found("transition", transition_id))?;
    let current = db::find_issue(&tx, issue.id)?.ok_or(WorkflowError::not_found("issue", issue.id))?;

    if transition.project_id != current.project_id {
        return Err(WorkflowError::ProjectMismatch {
            entity: "transition",
            id: transition_id,
            owner_project: transition.project_id,
            expected_project: current.project_id,
        });
    }

    if transition.from_status_id != current.status_id {
        return Err(WorkflowError::InvalidSourceState {
            issue_id: current.id,
            transition_id,
            current: current.status_id,
            expected: transition.from_status_id,
        });
    }

    let evaluation = evaluate(actor, &current, &transition);
    if !evaluation.allowed {
        return Err(WorkflowError::ValidationFailed(evaluation.errors));
    }

    let moved = Issue {
        status_id: transition.to_status_id,
        ..current.clone()
    };
    let saved = db::save_issue(&tx, &moved)?;
    let history = db::insert_history(
        &tx,
        &NewHistoryRecord {
            issue_id: current.id,
            transition_id: transition.id,
            from_status_id: current.status_id,
            to_status_id: transition.to_status_id,
            actor_id: actor.id,
            validation: evaluation,
            post_actions: transition.rules.post_actions.clone(),
        },
    )?;
    tx.commit()?;

    log::info!(
        "issue {} moved {} -> {} via '{}' by user {}",
        saved.id,
        history.from_status_id,
        history.to_status_id,
        transition.name,
        actor.id
    );

    let (issue, post_actions) = if run_post_actions {
        post_actions::dispatch(conn, &saved, &transition, actor)
    } else {
        (saved, Vec::new())
    };

    Ok(TransitionOutcome {
        issue,
        history,
        post_actions,
    })
}

/// Transitions leaving the issue's current status, each with its rule evaluation.
pub fn available_transitions(conn: &Connection, actor: &Actor, issue: &Issue) -> Result<Vec<AvailableTransition>> {
    let transitions = db::list_transitions(conn, issue.project_id)?;
    Ok(transitions
        .into_iter()
        .filter(|t| t.from_status_id == issue.status_id)
        .map(|transition| AvailableTransition {
            evaluation: evaluate(actor, issue, &transition),
            transition,
        })
        .collect())
}

pub fn issue_history(conn: &Connection, issue_id: i64) -> Result<Vec<TransitionHistory>> {
    db::list_history(conn, issue_id)
}
