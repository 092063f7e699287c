//! Bounded wait for backend write tasks.
//!
//! Both adapters return from a write only once the backend reports the task
//! terminal, so the next read sees it. The wait is capped at
//! `min(default, time left on the caller's deadline)`.

use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use super::error::BackendError;
use crate::context::CallContext;
use crate::metrics::SEARCH_TASK_WAIT_SECONDS;

/// Default wait for single-record writes
pub const SINGLE_WRITE_WAIT: Duration = Duration::from_millis(2000);

/// Default wait for batch writes and clears
pub const BATCH_WRITE_WAIT: Duration = Duration::from_millis(5000);

/// Delay between task status polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Status of a backend task as reported by one poll
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Pending,
    /// Finished; `details` is the backend's task summary
    Succeeded { details: Value },
    Failed { code: String, message: String },
}

/// Poll `poll` until the task is terminal or the bound expires.
///
/// Returns the task details on success. Failure, timeout, and caller
/// interruption are all reported as [`BackendError`]s so the caller can
/// classify them.
pub async fn wait_for_task<F, Fut>(
    ctx: &CallContext,
    backend: &str,
    task: u64,
    default_bound: Duration,
    poll_interval: Duration,
    mut poll: F,
) -> Result<Value, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TaskStatus, BackendError>>,
{
    let bound = ctx.wait_bound(default_bound);
    let started = Instant::now();

    let polling = poll_until_terminal(task, poll_interval, &mut poll);

    let result = match ctx.run(tokio::time::timeout(bound, polling)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_elapsed)) => Err(BackendError::TaskTimeout {
            task,
            waited_ms: bound.as_millis(),
        }),
        Err(interrupted) => Err(BackendError::Interrupted(interrupted)),
    };

    let elapsed = started.elapsed();
    SEARCH_TASK_WAIT_SECONDS
        .with_label_values(&[backend])
        .observe(elapsed.as_secs_f64());
    debug!(
        backend,
        task,
        bound_ms = bound.as_millis() as u64,
        elapsed_ms = elapsed.as_millis() as u64,
        ok = result.is_ok(),
        "Task wait finished"
    );
    result
}

async fn poll_until_terminal<F, Fut>(
    task: u64,
    poll_interval: Duration,
    poll: &mut F,
) -> Result<Value, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TaskStatus, BackendError>>,
{
    loop {
        match poll().await? {
            TaskStatus::Succeeded { details } => return Ok(details),
            TaskStatus::Failed { code, message } => {
                return Err(BackendError::Task {
                    task,
                    code,
                    message,
                })
            }
            TaskStatus::Pending => tokio::time::sleep(poll_interval).await,
        }
    }
}
