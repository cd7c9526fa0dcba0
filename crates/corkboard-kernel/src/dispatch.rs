//! Detached fan-out job execution.
//!
//! The coordinator hands one job per successful mutation to the
//! [`FanoutDispatcher`] and returns to its caller immediately. Jobs are
//! blocking closures run on tokio's blocking pool:
//!
//! - Submission never blocks: jobs queue as tasks awaiting a permit.
//! - At most `workers` jobs run at once (semaphore).
//! - Each job gets a UUIDv7 correlation id, recorded on its tracing span.
//! - A panicking job is caught at its `JoinHandle` and logged with that id;
//!   it never takes down the host or its sibling jobs.
//!
//! There is no cancellation and no ordering between jobs.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

struct Inner {
    handle: Handle,
    permits: Arc<Semaphore>,
    workers: usize,
    pending: AtomicUsize,
    idle: Notify,
    panicked: AtomicU64,
}

impl Inner {
    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Bounded pool for detached notification jobs.
#[derive(Clone)]
pub struct FanoutDispatcher {
    inner: Arc<Inner>,
}

impl FanoutDispatcher {
    /// Create a dispatcher whose jobs run on the given runtime.
    pub fn new(handle: Handle, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            inner: Arc::new(Inner {
                handle,
                permits: Arc::new(Semaphore::new(workers)),
                workers,
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                panicked: AtomicU64::new(0),
            }),
        }
    }

    /// Create a dispatcher on the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current(workers: usize) -> Self {
        Self::new(Handle::current(), workers)
    }

    /// Maximum number of jobs running at once.
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Jobs submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Jobs that panicked since the dispatcher was created.
    pub fn panicked_jobs(&self) -> u64 {
        self.inner.panicked.load(Ordering::Relaxed)
    }

    /// Queue a job and return its correlation id.
    pub fn submit<F>(&self, op: &'static str, job: F) -> Uuid
    where
        F: FnOnce() + Send + 'static,
    {
        let job_id = Uuid::now_v7();
        let span = tracing::info_span!("fanout", %job_id, op);
        self.inner.pending.fetch_add(1, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        self.inner.handle.spawn(async move {
            let _permit = Arc::clone(&inner.permits).acquire_owned().await;
            let result = tokio::task::spawn_blocking(move || {
                let _entered = span.enter();
                job();
            })
            .await;

            if let Err(e) = result {
                if e.is_panic() {
                    inner.panicked.fetch_add(1, Ordering::Relaxed);
                    let reason = panic_message(e.into_panic());
                    tracing::error!(%job_id, op, panic = %reason, "fan-out job panicked");
                } else {
                    tracing::warn!(%job_id, op, "fan-out job cancelled");
                }
            }
            inner.finish();
        });

        tracing::trace!(%job_id, op, "fan-out job queued");
        job_id
    }

    /// Wait until every submitted job has finished.
    pub async fn drain(&self) {
        loop {
            let mut idle = std::pin::pin!(self.inner.idle.notified());
            idle.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl std::fmt::Debug for FanoutDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutDispatcher")
            .field("workers", &self.inner.workers)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
