//! Scenario-based tests for envflow

mod gated_workflow;
mod matrix_isolation;
mod publication_queue;
mod strategy_equivalence;
