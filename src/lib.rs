pub mod analysis;
pub mod commands;
pub mod error;
pub mod models;

pub use analysis::graph::{path_exists, validate_graph, GraphRules, WorkflowValidation};
pub use analysis::rules::evaluate;
pub use commands::transition::{available_transitions, issue_history, perform, perform_detailed, TransitionOutcome};
pub use commands::workflow::{bootstrap_default_workflow, validate_workflow, Workflow};
pub use error::{Result, WorkflowError};

/// Install the `env_logger` backend for the `log` facade. Honours `RUST_LOG`;
/// calling it more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
