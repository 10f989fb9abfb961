//! Inline or queued task execution
//!
//! With no workers configured tasks run on the caller. Otherwise they go onto
//! a bounded channel drained by a fixed set of worker tasks; a task's failure
//! is logged by the worker and never reaches the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use nimbus_common::{NimbusError, Result};

use crate::config::TaskConfig;
use crate::tasks::{Task, TaskRunner};

/// Counters shared by queued workers
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub completed: AtomicU64,
    pub failed: AtomicU64,
}

pub enum TaskDispatcher {
    Inline(Arc<TaskRunner>),
    Queued(QueuedDispatcher),
}

impl TaskDispatcher {
    /// Inline when `queue_workers` is zero, queued otherwise
    pub fn from_config(runner: Arc<TaskRunner>, config: &TaskConfig) -> Self {
        if config.queue_workers == 0 {
            TaskDispatcher::Inline(runner)
        } else {
            TaskDispatcher::Queued(QueuedDispatcher::start(
                runner,
                config.queue_workers,
                config.queue_capacity,
            ))
        }
    }

    /// Run or enqueue a task
    ///
    /// Inline dispatch returns the task's own result; queued dispatch only
    /// fails when the queue is closed.
    pub async fn dispatch(&self, task: Task) -> Result<()> {
        match self {
            TaskDispatcher::Inline(runner) => runner.run(&task).await,
            TaskDispatcher::Queued(queue) => queue.enqueue(task).await,
        }
    }

    /// Wait for queued tasks to drain
    pub async fn shutdown(self) {
        if let TaskDispatcher::Queued(queue) = self {
            queue.shutdown().await;
        }
    }
}

pub struct QueuedDispatcher {
    tx: mpsc::Sender<Task>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<DispatchStats>,
}

impl QueuedDispatcher {
    /// Spawn `workers` tasks on the current runtime
    pub fn start(runner: Arc<TaskRunner>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Task>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(DispatchStats::default());

        let workers = (0..workers.max(1))
            .map(|id| {
                let runner = runner.clone();
                let rx = rx.clone();
                let stats = stats.clone();
                tokio::spawn(async move {
                    task_worker(id, runner, rx, stats).await;
                })
            })
            .collect();

        Self { tx, workers, stats }
    }

    pub async fn enqueue(&self, task: Task) -> Result<()> {
        self.tx
            .send(task)
            .await
            .map_err(|e| NimbusError::Internal(format!("task queue closed, dropped {}", e.0.name())))
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Close the queue and wait for workers to finish what was enqueued
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Task worker panicked: {}", e);
            }
        }
        info!(
            completed = self.stats.completed.load(Ordering::Relaxed),
            failed = self.stats.failed.load(Ordering::Relaxed),
            "Task queue drained"
        );
    }
}

async fn task_worker(
    id: usize,
    runner: Arc<TaskRunner>,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    stats: Arc<DispatchStats>,
) {
    loop {
        let task = rx.lock().await.recv().await;
        let Some(task) = task else {
            break;
        };
        match runner.run(&task).await {
            Ok(()) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    worker = id,
                    task = task.name(),
                    allocation_id = %task.allocation_id(),
                    "Task completed"
                );
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = id,
                    task = task.name(),
                    allocation_id = %task.allocation_id(),
                    "Task failed: {}", e
                );
            }
        }
    }
}
