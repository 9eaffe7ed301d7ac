pub mod actor;
pub mod history;
pub mod issue;
pub mod rules;
pub mod status;
pub mod transition;
