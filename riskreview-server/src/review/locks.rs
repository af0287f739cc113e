//! Per-assessment mutual exclusion.
//!
//! Every mutating operation on an assessment holds its lock from the first
//! read until the commit, so two approvals (or an approval and a restart)
//! on the same assessment never interleave inside one process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use riskreview_core::AssessmentId;

#[derive(Debug, Default)]
pub struct AssessmentLocks {
    locks: RwLock<HashMap<AssessmentId, Arc<Mutex<()>>>>,
}

impl AssessmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_create(&self, id: AssessmentId) -> Arc<Mutex<()>> {
        // Fast path: check if lock already exists
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(&id) {
                return lock.clone();
            }
        }

        // Slow path: create lock (double-check after acquiring write lock)
        let mut locks = self.locks.write().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to an assessment. Released on drop.
    pub async fn acquire(&self, id: AssessmentId) -> OwnedMutexGuard<()> {
        self.get_or_create(id).await.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_assessment_is_exclusive() {
        let locks = AssessmentLocks::new();
        let guard = locks.acquire(AssessmentId(1)).await;

        let lock = locks.get_or_create(AssessmentId(1)).await;
        assert!(lock.try_lock().is_err());

        drop(guard);
        assert!(lock.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_different_assessments_are_independent() {
        let locks = AssessmentLocks::new();
        let _first = locks.acquire(AssessmentId(1)).await;
        let second = locks.get_or_create(AssessmentId(2)).await;
        assert!(second.try_lock().is_ok());
    }
}
