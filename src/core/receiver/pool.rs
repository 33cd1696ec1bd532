//! Bounded pool of in-flight batch tasks

use crate::domain::{BridgeError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs batch tasks concurrently, at most `capacity` at a time
///
/// The pull loop hands every pulled batch to the pool and goes back to pulling;
/// it only waits when the pool is full. On shutdown the pool either drains the
/// running tasks or detaches them. Tasks are never aborted.
pub struct BatchPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    capacity: usize,
}

impl BatchPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks spawned and not yet reaped
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for a free slot, then spawns `task`
    pub async fn spawn<F>(&mut self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| BridgeError::Other(format!("batch pool closed: {e}")))?;
        self.reap();
        self.tasks.spawn(async move {
            task.await;
            drop(permit);
        });
        Ok(())
    }

    /// Collects finished tasks, logging any that panicked
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Batch task panicked");
            }
        }
    }

    /// Waits up to `timeout` for running tasks
    ///
    /// Returns the number of tasks still running at the deadline; they are
    /// detached and keep running.
    pub async fn drain(&mut self, timeout: Duration) -> usize {
        let tasks = &mut self.tasks;
        let finished = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Batch task panicked");
                }
            }
        })
        .await;

        if finished.is_ok() {
            return 0;
        }
        let remaining = self.tasks.len();
        tracing::warn!(remaining, "Shutdown timeout reached with batches still in flight");
        self.tasks.detach_all();
        remaining
    }

    /// Detaches every running task without waiting
    pub fn detach(&mut self) -> usize {
        let remaining = self.tasks.len();
        self.tasks.detach_all();
        remaining
    }
}
