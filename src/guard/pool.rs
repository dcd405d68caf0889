//! # Concurrency pool
//! Per-channel bound on simultaneously in-flight source calls. A thin
//! wrapper over `tokio::sync::Semaphore` with owned permits so release
//! happens on drop in every code path.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct ConcurrencyPool {
    capacity: usize,
    sem: Arc<Semaphore>,
}

impl ConcurrencyPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            sem: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Suspend until a slot frees, then hold it until the permit drops.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.sem
            .clone()
            .acquire_owned()
            .await
            .expect("pool semaphore closed")
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free (diagnostics only; racy by nature).
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
