pub mod graph;
pub mod rules;
