use crate::models::actor::Actor;
use crate::models::history::{CheckOutcome, TransitionEvaluation};
use crate::models::issue::Issue;
use crate::models::rules::Condition;
use crate::models::transition::Transition;

/// Evaluate every rule on `transition` for `actor` against `issue`.
///
/// The role, condition and field-validator passes all run even when an
/// earlier one fails, so the caller gets the full list of unmet rules.
/// Checking that the transition actually applies to the issue (project and
/// source status) is the engine's job, not this function's.
pub fn evaluate(actor: &Actor, issue: &Issue, transition: &Transition) -> TransitionEvaluation {
    let mut errors = Vec::new();
    let mut checks = Vec::new();

    let roles = &transition.rules.allowed_roles;
    if !roles.is_empty() {
        let passed = roles.iter().any(|role| role == &actor.role);
        if !passed {
            errors.push(format!("missing required role: one of [{}]", roles.join(", ")));
        }
        checks.push(CheckOutcome {
            kind: "role".to_string(),
            name: actor.role.clone(),
            passed,
        });
    }

    for condition in &transition.rules.conditions {
        let failure = check_condition(condition, issue);
        checks.push(CheckOutcome {
            kind: "condition".to_string(),
            name: condition.kind().to_string(),
            passed: failure.is_none(),
        });
        errors.extend(failure);
    }

    for validator in &transition.rules.validators {
        let passed = !issue.field_is_empty(&validator.field);
        if !passed {
            errors.push(validator.error_message());
        }
        checks.push(CheckOutcome {
            kind: "validator".to_string(),
            name: validator.field.clone(),
            passed,
        });
    }

    TransitionEvaluation {
        allowed: errors.is_empty(),
        errors,
        checks,
    }
}

/// Returns the error message for an unmet condition.
fn check_condition(condition: &Condition, issue: &Issue) -> Option<String> {
    match condition {
        Condition::AssigneeRequired if issue.assignee_id.is_none() => {
            Some("assignee must be set".to_string())
        }
        Condition::DescriptionRequired if issue.description.trim().is_empty() => {
            Some("description must not be empty".to_string())
        }
        Condition::EstimatedTimeRequired if issue.estimated_time.is_none() => {
            Some("estimated time must be set".to_string())
        }
        // subtasks_completed is reserved and unknown types are forward-compatible.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rules::{FieldValidator, RawRule};
    use crate::models::transition::TransitionRules;
    use serde_json::Map;

    fn issue() -> Issue {
        Issue {
            id: 10,
            project_id: 1,
            title: "Broken login".to_string(),
            description: String::new(),
            assignee_id: None,
            estimated_time: None,
            priority: None,
            status_id: 1,
            custom_fields: Map::new(),
            version: 0,
            updated_at: 0,
        }
    }

    fn transition(rules: TransitionRules) -> Transition {
        Transition {
            id: 5,
            project_id: 1,
            from_status_id: 1,
            to_status_id: 2,
            name: "Start".to_string(),
            description: None,
            rules,
        }
    }

    #[test]
    fn transition_without_rules_is_allowed() {
        let result = evaluate(&Actor::new(1, "developer"), &issue(), &transition(Default::default()));
        assert!(result.allowed);
        assert!(result.errors.is_empty());
        assert!(result.checks.is_empty());
    }

    #[test]
    fn actor_outside_allowed_roles_is_rejected() {
        let rules = TransitionRules {
            allowed_roles: vec!["manager".to_string(), "admin".to_string()],
            ..Default::default()
        };
        let result = evaluate(&Actor::new(1, "developer"), &issue(), &transition(rules.clone()));
        assert!(!result.allowed);
        assert!(result.errors[0].contains("role"));

        let result = evaluate(&Actor::new(2, "admin"), &issue(), &transition(rules));
        assert!(result.allowed);
    }

    #[test]
    fn every_failing_rule_is_reported() {
        let rules = TransitionRules {
            allowed_roles: vec!["manager".to_string()],
            conditions: vec![
                Condition::AssigneeRequired,
                Condition::DescriptionRequired,
                Condition::EstimatedTimeRequired,
            ],
            validators: vec![
                FieldValidator::new("priority"),
                FieldValidator::new("resolution").with_message("Pick a resolution"),
            ],
            post_actions: vec![],
        };

        let result = evaluate(&Actor::new(1, "developer"), &issue(), &transition(rules));

        assert!(!result.allowed);
        assert_eq!(result.errors.len(), 6);
        assert_eq!(result.checks.len(), 6);
        assert!(result.errors.contains(&"assignee must be set".to_string()));
        assert!(result.errors.contains(&"field priority is required".to_string()));
        assert!(result.errors.contains(&"Pick a resolution".to_string()));
    }

    #[test]
    fn reserved_and_unknown_conditions_pass() {
        let rules = TransitionRules {
            conditions: vec![
                Condition::SubtasksCompleted,
                Condition::Unknown(RawRule::new("linked_pr_merged")),
            ],
            ..Default::default()
        };
        let result = evaluate(&Actor::new(1, "developer"), &issue(), &transition(rules));
        assert!(result.allowed);
        assert!(result.checks.iter().all(|c| c.passed));
    }

    #[test]
    fn satisfied_conditions_pass() {
        let mut ready = issue();
        ready.assignee_id = Some(3);
        ready.description = "Steps to reproduce".to_string();
        ready.estimated_time = Some(1.0);
        let rules = TransitionRules {
            conditions: vec![
                Condition::AssigneeRequired,
                Condition::DescriptionRequired,
                Condition::EstimatedTimeRequired,
            ],
            validators: vec![FieldValidator::new("description")],
            ..Default::default()
        };
        let result = evaluate(&Actor::new(1, "developer"), &ready, &transition(rules));
        assert!(result.allowed, "unexpected errors: {:?}", result.errors);
    }
}
