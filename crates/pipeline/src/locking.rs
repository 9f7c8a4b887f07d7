//! Per-session logical lock (§5 ordering guarantee, option a): the
//! orchestrator acquires this before loading a session and holds it
//! until the turn's session write has been persisted, so two concurrent
//! requests against the same session serialize instead of racing each
//! other's reads and writes of `Session.variables`/`active_step_id`.
//!
//! Grounded in the server crate's `SessionManager` pattern (a
//! `parking_lot::RwLock`-guarded map keyed by session id), generalized
//! to hand out one `tokio::sync::Mutex` per key instead of an immutable
//! struct, since the critical section here spans `.await` points.

use align_core::ids::SessionId;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of one turn; dropping it releases the lock.
pub struct SessionLockGuard {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Default)]
pub struct SessionLockRegistry {
    locks: SyncMutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `session_id`, creating its entry if this is
    /// the first turn to touch it. Stale entries (no other holder and no
    /// other pending acquirer) are pruned opportunistically so the map
    /// does not grow unbounded across a long-lived process.
    pub async fn acquire(&self, session_id: SessionId) -> SessionLockGuard {
        let mutex = {
            let mut locks = self.locks.lock();
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(session_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let guard = mutex.lock_owned().await;
        SessionLockGuard { _guard: guard }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serializes_acquisitions_for_the_same_session() {
        let registry = Arc::new(SessionLockRegistry::new());
        let session_id = SessionId::new();
        let order = Arc::new(SyncMutex::new(Vec::new()));

        let r1 = registry.clone();
        let o1 = order.clone();
        let h1 = tokio::spawn(async move {
            let _guard = r1.acquire(session_id).await;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            o1.lock().push(1);
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let r2 = registry.clone();
        let o2 = order.clone();
        let h2 = tokio::spawn(async move {
            let _guard = r2.acquire(session_id).await;
            o2.lock().push(2);
        });

        h1.await.unwrap();
        h2.await.unwrap();
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn different_sessions_do_not_contend() {
        let registry = SessionLockRegistry::new();
        let a = registry.acquire(SessionId::new()).await;
        let b = registry.acquire(SessionId::new()).await;
        drop(a);
        drop(b);
    }
}
