//! Background Task Supervisor
//!
//! Owns fire-and-forget work (cache repopulation) whose lifetime must not be
//! tied to the screen that triggered it. Dropping a [`TaskHandle`] does not
//! cancel the task; only [`TaskSupervisor::shutdown`] does.
//!
//! ```ignore
//! let supervisor = TaskSupervisor::new();
//! let handle = supervisor.spawn("refresh", async { Ok::<_, String>(()) });
//! assert_eq!(handle.wait().await, TaskOutcome::Completed);
//! supervisor.shutdown();
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    /// Stopped by supervisor shutdown.
    Cancelled,
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct SupervisorMetrics {
    pub spawned: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
}

impl SupervisorMetrics {
    fn record(&self, outcome: &TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Completed => &self.completed,
            TaskOutcome::Failed(_) => &self.failed,
            TaskOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// SUPERVISOR
// ============================================================================

struct Shared {
    active: AtomicUsize,
    metrics: SupervisorMetrics,
    shutdown_tx: watch::Sender<bool>,
}

/// Decrements the active count even if the task panics.
struct ActiveGuard(Arc<Shared>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Process-wide owner of background tasks. Clones share state.
#[derive(Clone)]
pub struct TaskSupervisor {
    shared: Arc<Shared>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                active: AtomicUsize::new(0),
                metrics: SupervisorMetrics::default(),
                shutdown_tx,
            }),
        }
    }

    /// Spawn `task` on the runtime. Must be called from within a tokio runtime.
    pub fn spawn<F, E>(&self, name: &'static str, task: F) -> TaskHandle
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.spawn_with_id(Uuid::now_v7(), name, task)
    }

    /// Like [`Self::spawn`] with a caller-chosen id, so the task can report
    /// its own id in events.
    pub fn spawn_with_id<F, E>(&self, id: Uuid, name: &'static str, task: F) -> TaskHandle
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (done_tx, done_rx) = watch::channel(None);
        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();

        self.shared.active.fetch_add(1, Ordering::SeqCst);
        self.shared.metrics.spawned.fetch_add(1, Ordering::Relaxed);
        let guard = ActiveGuard(Arc::clone(&self.shared));

        tokio::spawn(async move {
            debug!(task = name, task_id = %id, "background task started");
            let outcome = tokio::select! {
                result = task => match result {
                    Ok(()) => TaskOutcome::Completed,
                    Err(e) => TaskOutcome::Failed(e.to_string()),
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => TaskOutcome::Cancelled,
            };

            match &outcome {
                TaskOutcome::Failed(reason) => {
                    warn!(task = name, task_id = %id, reason = %reason, "background task failed")
                }
                other => debug!(task = name, task_id = %id, outcome = ?other, "background task finished"),
            }
            guard.0.metrics.record(&outcome);
            drop(guard);
            let _ = done_tx.send(Some(outcome));
        });

        TaskHandle { id, done: done_rx }
    }

    /// Tasks spawned and not yet finished.
    pub fn active_tasks(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> &SupervisorMetrics {
        &self.shared.metrics
    }

    /// Cancel every running task. Tasks spawned afterwards are cancelled
    /// immediately.
    pub fn shutdown(&self) {
        let _ = self.shared.shutdown_tx.send(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shared.shutdown_tx.borrow()
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stopped| *stopped).await.is_err() {
        // Supervisor dropped without shutdown: the task runs to completion.
        std::future::pending::<()>().await;
    }
}

/// Completion handle for one supervised task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: Uuid,
    done: watch::Receiver<Option<TaskOutcome>>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    pub async fn wait(mut self) -> TaskOutcome {
        match self.done.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome)
                .clone()
                .unwrap_or_else(|| TaskOutcome::Failed("task aborted".to_string())),
            Err(_) => TaskOutcome::Failed("task aborted".to_string()),
        }
    }
}
