//! Bounded worker pool bridging async callers to blocking inference.
//!
//! Jobs run on a fixed-size rayon pool; the caller awaits a oneshot receiver,
//! so an async task is suspended rather than blocked while the job runs.

use crate::core::errors::{HistoError, HistoResult};
use std::any::Any;
use tokio::sync::oneshot;
use tracing::error;

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[derive(Debug)]
pub struct InferencePool {
    pool: rayon::ThreadPool,
}

impl InferencePool {
    /// Starts a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> HistoResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("histo-infer-{i}"))
            .panic_handler(|payload| {
                error!("inference worker panicked: {}", panic_message(payload.as_ref()));
            })
            .build()
            .map_err(|e| {
                HistoError::worker_unavailable(format!("failed to start inference pool: {e}"))
            })?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `job` on the pool and waits for its result without blocking the
    /// calling task.
    ///
    /// # Errors
    ///
    /// The job's own error, or [`HistoError::WorkerUnavailable`] if the job
    /// panicked before producing a result.
    pub async fn run<F, T>(&self, job: F) -> HistoResult<T>
    where
        F: FnOnce() -> HistoResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            // the receiver may be gone if the caller was cancelled
            let _ = tx.send(job());
        });
        rx.await.map_err(|_| {
            HistoError::worker_unavailable("inference job ended without producing a result")
        })?
    }
}
