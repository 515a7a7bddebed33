//! Execution scheduler - decides how many jobs run at once

use std::str::FromStr;

/// Strategy for scheduling environment jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// One job at a time, in declared order
    #[default]
    Sequential,

    /// Every selected job at once
    Parallel,

    /// At most N concurrent jobs
    LimitedParallel(usize),
}

impl FromStr for SchedulingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(SchedulingStrategy::Sequential),
            "parallel" => Ok(SchedulingStrategy::Parallel),
            other => match other.strip_prefix("parallel-") {
                Some(n) => n
                    .parse::<usize>()
                    .map(SchedulingStrategy::LimitedParallel)
                    .map_err(|_| format!("invalid worker count in '{}'", other)),
                None => Err(format!("unknown scheduling strategy: {}", other)),
            },
        }
    }
}

/// Scheduler for determining job concurrency
#[derive(Debug, Clone, Copy)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Worker slots for a run of `total_jobs` jobs; never zero
    pub fn max_concurrent(&self, total_jobs: usize) -> usize {
        let limit = match self.strategy {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => total_jobs,
            SchedulingStrategy::LimitedParallel(max) => max.min(total_jobs),
        };
        limit.max(1)
    }

    /// Whether jobs have to run inline, one after the other
    pub fn is_sequential(&self, total_jobs: usize) -> bool {
        self.max_concurrent(total_jobs) == 1
    }
}
