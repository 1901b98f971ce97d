//! Bounded worker pool for ingest and persistence jobs.
//!
//! Connection handlers must never wait on tag reads, resolver round-trips or
//! catalog writes. They hand that work to a [`WorkerPool`] and get back a
//! [`JoinHandle`] they can await (or ignore). At most `limit` jobs run at
//! once; the rest queue on the semaphore without blocking the submitter.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::error::NukeboxError;

/// Semaphore-bounded job runner.
///
/// Cheap to clone; clones share the same limit and counters.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    limit: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `limit` jobs concurrently.
    ///
    /// A limit of zero is treated as one.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            active: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Maximum number of concurrent jobs.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of jobs currently holding a permit.
    #[must_use]
    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Schedules `job` and returns immediately.
    ///
    /// The job waits for a permit inside its own task, so the caller never
    /// blocks. Once started it runs to completion; dropping the handle does
    /// not cancel it.
    pub fn submit<F, T>(&self, job: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let active = Arc::clone(&self.active);
        tokio::spawn(async move {
            // The semaphore is never closed, so acquire only fails if it is.
            let _slot = match permits.acquire_owned().await {
                Ok(permit) => Some(JobSlot::new(permit, active)),
                Err(_) => None,
            };
            job.await
        })
    }

    /// Runs blocking work off the async threads and waits for it.
    ///
    /// Meant to be called from inside a submitted job.
    pub async fn run_blocking<F, T>(work: F) -> Result<T, NukeboxError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| NukeboxError::Internal(format!("blocking task failed: {e}")))
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("limit", &self.limit)
            .field("active", &self.active_jobs())
            .finish()
    }
}

/// Holds a pool permit and the active-job count for one job.
///
/// Both are released when the job finishes, panics or is aborted.
struct JobSlot {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl JobSlot {
    fn new(permit: OwnedSemaphorePermit, active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            _permit: permit,
            active,
        }
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
