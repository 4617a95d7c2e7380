//! Detached background task executor.
//!
//! Issuance and rotation schedule their cache writes here and return without
//! waiting. Each task runs on the runtime under its own timeout, so it
//! survives cancellation of the request that scheduled it and cannot stall
//! forever on a hung cache. Outcomes are visible only through logs and the
//! `session_background_tasks_total` counter; nothing is retried.

use crate::observability::metrics::record_background_task;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct DetachedTasks {
    timeout: Duration,
    tracker: TaskTracker,
}

impl DetachedTasks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            tracker: TaskTracker::new(),
        }
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Submit `work` under the task name `task`.
    ///
    /// Must be called from within a Tokio runtime. Returns immediately.
    pub fn spawn<F, E>(&self, task: &'static str, work: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let timeout = self.timeout;
        self.tracker.spawn(async move {
            match tokio::time::timeout(timeout, work).await {
                Ok(Ok(())) => {
                    debug!(target: "session.tasks", task, "Background task completed");
                    record_background_task(task, "success");
                }
                Ok(Err(e)) => {
                    warn!(target: "session.tasks", task, error = %e, "Background task failed");
                    record_background_task(task, "error");
                }
                Err(_) => {
                    warn!(
                        target: "session.tasks",
                        task,
                        timeout_seconds = timeout.as_secs(),
                        "Background task abandoned after timeout"
                    );
                    record_background_task(task, "timeout");
                }
            }
        });
    }

    /// Wait until every task spawned so far has finished.
    ///
    /// New tasks may still be spawned while waiting.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait for in-flight tasks, giving up after `limit`.
    ///
    /// Returns `true` if every task finished in time.
    pub async fn drain(&self, limit: Duration) -> bool {
        let pending = self.in_flight();
        if tokio::time::timeout(limit, self.wait_idle()).await.is_ok() {
            true
        } else {
            self.tracker.reopen();
            warn!(
                target: "session.tasks",
                pending,
                remaining = self.in_flight(),
                "Shutdown drain timed out with background tasks still running"
            );
            false
        }
    }
}
