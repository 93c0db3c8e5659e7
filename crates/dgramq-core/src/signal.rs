use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::sync::lock;

/// Callback run once when a [`Signal`] fires.
pub(crate) type Waker = Arc<dyn Fn() + Send + Sync>;

/// One-shot broadcast.
///
/// Firing runs every registered waker exactly once; wakers registered after
/// the fact run immediately. Waiters are expected to re-check their own state
/// after being woken, the signal carries no payload.
pub(crate) struct Signal {
    fired: AtomicBool,
    next_id: AtomicU64,
    wakers: Mutex<Vec<(u64, Waker)>>,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            wakers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Fire the signal. Returns false if it had already fired.
    pub(crate) fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let wakers = std::mem::take(&mut *lock(&self.wakers));
        for (_, waker) in wakers {
            waker();
        }
        true
    }

    /// Register `waker` to run when the signal fires.
    ///
    /// Must not be called while holding a lock the waker itself takes: if the
    /// signal already fired the waker runs on the calling thread.
    pub(crate) fn register(&self, waker: Waker) -> Registration<'_> {
        let mut wakers = lock(&self.wakers);
        if self.is_fired() {
            drop(wakers);
            waker();
            return Registration {
                signal: self,
                id: None,
            };
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        wakers.push((id, waker));
        Registration {
            signal: self,
            id: Some(id),
        }
    }

    /// Register a waker for the lifetime of the signal.
    pub(crate) fn register_forever(&self, waker: Waker) {
        std::mem::forget(self.register(waker));
    }

    fn unregister(&self, id: u64) {
        lock(&self.wakers).retain(|(registered, _)| *registered != id);
    }
}

/// Removes its waker from the signal when dropped.
pub(crate) struct Registration<'a> {
    signal: &'a Signal,
    id: Option<u64>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.signal.unregister(id);
        }
    }
}
