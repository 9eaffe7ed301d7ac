use crate::models::status::Status;
use crate::models::transition::Transition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Structural expectations for a project's graph.
#[derive(Debug, Clone)]
pub struct GraphRules {
    pub min_status_count: usize,
    pub initial_status_key: String,
    pub terminal_status_key: String,
    pub warn_self_loops: bool,
}

impl Default for GraphRules {
    fn default() -> Self {
        GraphRules {
            min_status_count: 3,
            initial_status_key: "TODO".to_string(),
            terminal_status_key: "DONE".to_string(),
            warn_self_loops: true,
        }
    }
}

/// Structural analysis of one project's workflow graph.
///
/// `statuses` is every status visible to the project (its own plus the global
/// ones) and `transitions` its edges. Only statuses in effect are checked: the
/// project's own, and global ones its transitions use whose key the project
/// does not redefine. Never fails: problems are reported as errors (blocking)
/// or warnings (advisory).
pub fn validate_graph(
    statuses: &[Status],
    transitions: &[Transition],
    rules: &GraphRules,
) -> WorkflowValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let in_effect = statuses_in_effect(statuses, transitions);
    if in_effect.len() < rules.min_status_count {
        errors.push(format!(
            "workflow must have at least {} statuses (found {})",
            rules.min_status_count,
            in_effect.len()
        ));
    }

    let initial = in_effect.iter().find(|s| s.key == rules.initial_status_key);
    let terminal = in_effect.iter().find(|s| s.key == rules.terminal_status_key);
    if initial.is_none() {
        errors.push(format!("workflow has no '{}' status", rules.initial_status_key));
    }
    if terminal.is_none() {
        errors.push(format!("workflow has no '{}' status", rules.terminal_status_key));
    }

    let edges: Vec<(i64, i64)> = transitions
        .iter()
        .map(|t| (t.from_status_id, t.to_status_id))
        .collect();

    let sources: HashSet<i64> = edges.iter().map(|&(from, _)| from).collect();
    for status in &in_effect {
        if status.key != rules.terminal_status_key && !sources.contains(&status.id) {
            errors.push(format!("status '{}' has no outgoing transitions", status.name));
        }
    }

    if let (Some(initial), Some(terminal)) = (initial, terminal) {
        if !path_exists(initial.id, terminal.id, &edges) {
            errors.push(format!(
                "no path from '{}' to '{}'",
                initial.key, terminal.key
            ));
        }
    }

    let names: HashMap<i64, &str> = statuses.iter().map(|s| (s.id, s.name.as_str())).collect();
    let name_of = |id: i64| {
        names
            .get(&id)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("#{id}"))
    };

    let mut loops: BTreeSet<(String, String)> = BTreeSet::new();
    for transition in transitions {
        if transition.is_self_loop() && rules.warn_self_loops {
            warnings.push(format!(
                "transition '{}' loops from '{}' back to itself",
                transition.name,
                name_of(transition.from_status_id)
            ));
        }

        if path_exists(transition.to_status_id, transition.from_status_id, &edges) {
            let a = name_of(transition.from_status_id);
            let b = name_of(transition.to_status_id);
            loops.insert(if a <= b { (a, b) } else { (b, a) });
        }
    }

    if !loops.is_empty() {
        let pairs: Vec<String> = loops
            .into_iter()
            .map(|(a, b)| format!("{a} <-> {b}"))
            .collect();
        warnings.push(format!("workflow contains loops: {}", pairs.join(", ")));
    }

    WorkflowValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn statuses_in_effect<'a>(statuses: &'a [Status], transitions: &[Transition]) -> Vec<&'a Status> {
    let own_keys: HashSet<&str> = statuses
        .iter()
        .filter(|s| !s.is_global())
        .map(|s| s.key.as_str())
        .collect();
    let used: HashSet<i64> = transitions
        .iter()
        .flat_map(|t| [t.from_status_id, t.to_status_id])
        .collect();

    statuses
        .iter()
        .filter(|s| !s.is_global() || (used.contains(&s.id) && !own_keys.contains(s.key.as_str())))
        .collect()
}

/// Breadth-first search for a directed path from `start` to `end`.
pub fn path_exists(start: i64, end: i64, edges: &[(i64, i64)]) -> bool {
    if start == end {
        return true;
    }

    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for &(from, to) in edges {
        adjacency.entry(from).or_default().push(to);
    }

    let mut visited = HashSet::from([start]);
    let mut frontier = VecDeque::from([start]);

    while let Some(current) = frontier.pop_front() {
        let Some(next) = adjacency.get(&current) else {
            continue;
        };
        for &neighbour in next {
            if neighbour == end {
                return true;
            }
            if visited.insert(neighbour) {
                frontier.push_back(neighbour);
            }
        }
    }

    false
}
