//! Job execution and workflow dispatch

pub mod engine;
pub mod executor;
pub mod scheduler;
pub mod workflow;

pub use engine::{EventBus, EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{CommandRecord, JobExecutor, JobOutcome};
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
pub use workflow::{PublicationOutcome, PublicationStage, RunReport, Workflow, WorkflowOutcome};
