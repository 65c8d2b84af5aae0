//! Observation of background task lifecycles.
//!
//! Long-running tasks in this crate (window ingestion, resampler ticks, mock
//! sources) return a [`TaskResult`]. The helpers here await their
//! `JoinHandle`s and log each terminal state, keeping the three endings apart:
//! a task that finished on its own, one that was cancelled by its owner, and
//! one that failed with an error or a panic.

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::WindowResult;

/// How a background task left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    /// Work ran out, e.g. the upstream channel was closed
    Completed,
    /// The owner requested shutdown
    Cancelled,
}

/// Return type of every background task.
pub type TaskResult = WindowResult<TaskExit>;

/// Terminal state of a task as observed by its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Ended on its own
    Finished,
    /// Stopped by its owner or aborted
    Cancelled,
    /// Returned an error or panicked; carries the message
    Failed(String),
}

impl TaskOutcome {
    /// True if the task ended with an error or a panic.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }
}

/// Await one task and log how it ended.
pub async fn join_task(name: &str, handle: JoinHandle<TaskResult>) -> TaskOutcome {
    match handle.await {
        Ok(Ok(TaskExit::Completed)) => {
            info!(task = name, "Task finished normally");
            TaskOutcome::Finished
        }
        Ok(Ok(TaskExit::Cancelled)) => {
            info!(task = name, "Task cancelled");
            TaskOutcome::Cancelled
        }
        Ok(Err(err)) => {
            error!(task = name, error = %err, "Task raised an error");
            TaskOutcome::Failed(err.to_string())
        }
        Err(join_err) if join_err.is_cancelled() => {
            info!(task = name, "Task aborted");
            TaskOutcome::Cancelled
        }
        Err(join_err) => {
            error!(task = name, error = %join_err, "Task panicked");
            TaskOutcome::Failed(join_err.to_string())
        }
    }
}

/// Await all tasks in completion order, logging each one as it ends.
pub async fn wait_all<I>(tasks: I) -> Vec<(String, TaskOutcome)>
where
    I: IntoIterator<Item = (String, JoinHandle<TaskResult>)>,
{
    let mut pending: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|(name, handle)| async move {
            let outcome = join_task(&name, handle).await;
            (name, outcome)
        })
        .collect();

    info!(count = pending.len(), "Waiting for tasks");
    let mut outcomes = Vec::with_capacity(pending.len());
    while let Some(outcome) = pending.next().await {
        outcomes.push(outcome);
    }
    info!(count = outcomes.len(), "All tasks finished");
    outcomes
}
