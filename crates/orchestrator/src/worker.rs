//! Bounded worker pool for background orchestration work
//!
//! Request handlers dispatch analysis work here and return immediately.
//! Concurrency is capped by a semaphore and the dispatched-but-not-started
//! backlog is capped separately, so a flood of requests surfaces as a
//! `WorkerQueueFull` error instead of unbounded task growth.

use docugrade_common::errors::{AppError, Result};
use docugrade_common::metrics::METRICS_PREFIX;
use metrics::gauge;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    backlog: Arc<AtomicUsize>,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize, queue_capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            backlog: Arc::new(AtomicUsize::new(0)),
            queue_capacity,
        }
    }

    /// Dispatch a background task, returning immediately.
    ///
    /// The task starts once a worker permit is free. Fails with
    /// `WorkerQueueFull` when the backlog bound is reached.
    pub fn dispatch<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let queued = self.backlog.fetch_add(1, Ordering::SeqCst);
        if queued >= self.queue_capacity {
            self.backlog.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::WorkerQueueFull {
                capacity: self.queue_capacity,
            });
        }
        gauge!(format!("{}_worker_backlog", METRICS_PREFIX)).set((queued + 1) as f64);

        let semaphore = self.semaphore.clone();
        let backlog = self.backlog.clone();

        tokio::spawn(async move {
            // Semaphore is never closed, so acquire only fails on shutdown races
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    backlog.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };
            let remaining = backlog.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            gauge!(format!("{}_worker_backlog", METRICS_PREFIX)).set(remaining as f64);

            fut.await;
            drop(permit);
        });

        Ok(())
    }

    /// Current dispatched-but-not-started backlog
    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::SeqCst)
    }
}
