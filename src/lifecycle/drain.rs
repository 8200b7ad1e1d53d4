//! Drain barrier: counts outstanding units of work.
//!
//! A unit is registered with [`DrainTracker::track`] *before* the task that
//! owns it is spawned, and released when the returned [`DrainGuard`] drops,
//! so every exit path of that task (including a panic) retires it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    active: AtomicU64,
    idle: Notify,
}

/// Tracks live work so shutdown can wait for all of it.
#[derive(Debug, Clone, Default)]
pub struct DrainTracker {
    inner: Arc<Inner>,
}

impl DrainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one unit of work. It stays outstanding until the guard drops.
    pub fn track(&self, kind: &'static str) -> DrainGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        DrainGuard {
            inner: Arc::clone(&self.inner),
            kind,
        }
    }

    /// Current number of outstanding units.
    pub fn active_count(&self) -> u64 {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until no units are outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register interest before checking so a release in between is not missed.
            notified.as_mut().enable();

            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One outstanding unit of work. Releases itself on drop.
#[derive(Debug)]
pub struct DrainGuard {
    inner: Arc<Inner>,
    kind: &'static str,
}

impl DrainGuard {
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        let remaining = self.inner.active.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::trace!(kind = self.kind, remaining, "Work unit retired");
        if remaining == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}
