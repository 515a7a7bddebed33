//! Main execution engine - runs a set of environment jobs

use crate::{
    core::{EnvironmentSpec, ExecutionStatus, PublicationStep},
    execution::{ExecutionScheduler, JobExecutor, JobOutcome, SchedulingStrategy},
    resolver::StrategyResolver,
    runner::CommandRunner,
};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

/// Events that can occur during a workflow run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        workflow: String,
        jobs: usize,
    },
    RunSkipped {
        run_id: Uuid,
        reason: String,
    },
    JobStarted {
        env_id: String,
    },
    JobPrepared {
        env_id: String,
        root: PathBuf,
    },
    CommandStarted {
        env_id: String,
        command: String,
    },
    JobCompleted {
        env_id: String,
        commands_run: usize,
    },
    JobFailed {
        env_id: String,
        step: String,
        error: String,
    },
    PublicationQueued {
        target: String,
        concurrency_group: String,
    },
    PublicationCompleted {
        target: String,
        url: String,
    },
    PublicationFailed {
        target: String,
        step: PublicationStep,
        error: String,
    },
    RunCompleted {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to every registered handler
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(handler));
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Runs environment jobs, sequentially or on parallel workers.
///
/// Jobs share nothing but the runner; a failing job never cancels or
/// alters its siblings.
pub struct ExecutionEngine<R> {
    scheduler: ExecutionScheduler,
    executor: Arc<JobExecutor<R>>,
    events: EventBus,
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R, resolver: StrategyResolver, strategy: SchedulingStrategy) -> Self {
        Self {
            scheduler: ExecutionScheduler::new(strategy),
            executor: Arc::new(JobExecutor::new(runner, resolver)),
            events: EventBus::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn resolver(&self) -> &StrategyResolver {
        self.executor.resolver()
    }

    /// Run every job and return the outcomes in the order of `specs`
    pub async fn run_jobs(&self, specs: Vec<EnvironmentSpec>, posargs: &[String]) -> Vec<JobOutcome> {
        let total = specs.len();
        let workers = self.scheduler.max_concurrent(total);
        info!("Running {} job(s) with {} worker(s)", total, workers);

        if self.scheduler.is_sequential(total) {
            let mut outcomes = Vec::with_capacity(total);
            for spec in &specs {
                outcomes.push(run_job(&self.executor, &self.events, spec, posargs).await);
            }
            return outcomes;
        }

        let semaphore = Arc::new(Semaphore::new(workers));
        let posargs: Arc<[String]> = posargs.into();
        let mut join_set = JoinSet::new();

        for (index, spec) in specs.iter().cloned().enumerate() {
            let executor = Arc::clone(&self.executor);
            let events = self.events.clone();
            let semaphore = Arc::clone(&semaphore);
            let posargs = Arc::clone(&posargs);

            join_set.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                (index, run_job(&executor, &events, &spec, &posargs).await)
            });
        }

        let mut slots: Vec<Option<JobOutcome>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!("Job worker terminated abnormally: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(specs.iter())
            .map(|(slot, spec)| {
                slot.unwrap_or_else(|| {
                    JobOutcome::aborted(&spec.id, spec.runner_strategy, "job worker terminated abnormally")
                })
            })
            .collect()
    }
}

async fn run_job<R: CommandRunner>(
    executor: &JobExecutor<R>,
    events: &EventBus,
    spec: &EnvironmentSpec,
    posargs: &[String],
) -> JobOutcome {
    events.emit(ExecutionEvent::JobStarted {
        env_id: spec.id.clone(),
    });

    let emit = |event: ExecutionEvent| events.emit(event);
    let outcome = executor.execute(spec, posargs, &emit).await;

    match &outcome.state {
        crate::core::JobState::Completed { commands_run, .. } => {
            events.emit(ExecutionEvent::JobCompleted {
                env_id: spec.id.clone(),
                commands_run: *commands_run,
            })
        }
        crate::core::JobState::Failed { error, step, .. } => events.emit(ExecutionEvent::JobFailed {
            env_id: spec.id.clone(),
            step: step.clone(),
            error: error.clone(),
        }),
        _ => {}
    }

    outcome
}
