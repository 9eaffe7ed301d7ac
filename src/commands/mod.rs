pub mod db;
pub mod post_actions;
pub mod settings;
pub mod transition;
pub mod workflow;
