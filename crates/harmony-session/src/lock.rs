//! Per-session mutual exclusion (C11, §5). Grounded in the teacher's
//! `DashMap`-per-key idiom (`HealthTracker`/`AppState`): a concurrent map of
//! per-key handles rather than one global lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::model::SessionId;

/// Concurrent map of per-session locks. A session's exclusive handle is a
/// `tokio::sync::Mutex<()>` reached through an `Arc` so the map entry can be
/// shared with in-flight acquirers without holding the map itself locked.
#[derive(Default)]
pub struct LockProvider {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

/// Held exclusively for the duration of one `ExecuteNext`/`ExecuteMessage`
/// call. Releases on drop — including on cancellation or panic — so the
/// engine can never deadlock on a collaborator that hangs (§5).
pub struct SessionLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl LockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &SessionId) -> SessionLockGuard {
        let handle = self
            .locks
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = handle.lock_owned().await;
        SessionLockGuard { _guard: guard }
    }

    /// Same as [`acquire`](Self::acquire), but gives up and returns `None`
    /// if `cancel` fires before the lock is granted — the bound spec.md §5
    /// places on lock acquisition ("bounded only by cancellation").
    pub async fn acquire_cancellable(
        &self,
        session_id: &SessionId,
        cancel: Option<&CancellationToken>,
    ) -> Option<SessionLockGuard> {
        let handle = self
            .locks
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        match cancel {
            Some(token) if token.is_cancelled() => None,
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                guard = handle.lock_owned() => Some(SessionLockGuard { _guard: guard }),
            },
            None => Some(SessionLockGuard { _guard: handle.lock_owned().await }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn acquiring_the_same_key_serializes_access() {
        let provider = Arc::new(LockProvider::new());
        let counter = Arc::new(AtomicU32::new(0));
        let max_concurrent = Arc::new(AtomicU32::new(0));
        let id = SessionId("s1".to_string());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let provider = Arc::clone(&provider);
            let counter = Arc::clone(&counter);
            let max_concurrent = Arc::clone(&max_concurrent);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let _guard = provider.acquire(&id).await;
                let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let provider = LockProvider::new();
        let a = provider.acquire(&SessionId("a".to_string())).await;
        let b = provider.acquire(&SessionId("b".to_string())).await;
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn acquire_cancellable_returns_none_once_cancelled() {
        let provider = Arc::new(LockProvider::new());
        let id = SessionId("s1".to_string());
        let held = provider.acquire(&id).await;

        let token = CancellationToken::new();
        token.cancel();
        let outcome = provider.acquire_cancellable(&id, Some(&token)).await;
        assert!(outcome.is_none());

        drop(held);
    }

    #[tokio::test]
    async fn acquire_cancellable_succeeds_when_not_cancelled() {
        let provider = LockProvider::new();
        let id = SessionId("s1".to_string());
        let token = CancellationToken::new();
        let guard = provider.acquire_cancellable(&id, Some(&token)).await;
        assert!(guard.is_some());
    }
}
