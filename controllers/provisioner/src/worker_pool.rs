//! Bounded fan-out over a list of per-node tasks

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::error;

/// Runs one task per item with at most `limit` in flight
#[derive(Debug, Clone)]
pub struct WorkerPool {
    limit: usize,
}

impl WorkerPool {
    /// A limit of 0 is treated as 1
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `task` for every item and return the results in input order.
    /// A task that panics is logged and leaves `None` in its slot.
    pub async fn run<I, R, F, Fut>(&self, items: Vec<I>, task: F) -> Vec<Option<R>>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.limit));
        let handles: Vec<_> = items
            .into_iter()
            .map(|item| {
                let permits = permits.clone();
                let work = task(item);
                tokio::spawn(async move {
                    // The semaphore is never closed
                    let _permit = permits.acquire_owned().await.ok();
                    work.await
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(index, joined)| match joined {
                Ok(result) => Some(result),
                Err(e) => {
                    error!("Worker task {} failed: {}", index, e);
                    None
                }
            })
            .collect()
    }
}
