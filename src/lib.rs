//! envflow - declarative, gated build/test environment orchestration

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod publication;
pub mod resolver;
pub mod runner;

// Re-export commonly used types
pub use crate::core::{
    EnvironmentRegistry, EnvironmentSpec, EventType, ExecutionStatus, MatrixTemplate, OrchestrationError,
    RepositoryIdentity, RunnerStrategy, TriggerEvent, TriggerGate,
};
pub use crate::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy, Workflow, WorkflowOutcome};
pub use crate::publication::{HostingProvider, PublicationJob, PublicationPipeline, PublicationResult};
pub use crate::resolver::{DependencyResolver, IsolatedEnvironment, StrategyResolver};
pub use crate::runner::{CommandRunner, SubprocessRunner};
