//! Single-flight result cache with a TTL window
//!
//! Concurrent callers are serialized on one computation; callers arriving
//! within the TTL receive the cached value. `reset` invalidates immediately
//! so the next call recomputes regardless of remaining lifetime.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct Single<T> {
    ttl: Duration,
    slot: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> Single<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached value if fresh, otherwise run `f` and cache its
    /// result. The lock is held across the computation, so concurrent
    /// callers coalesce onto a single execution.
    pub fn do_cached<F>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((at, value)) = slot.as_ref() {
            if at.elapsed() < self.ttl {
                return value.clone();
            }
        }
        let value = f();
        *slot = Some((Instant::now(), value.clone()));
        value
    }

    /// Drop the cached value; the next `do_cached` recomputes.
    pub fn reset(&self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
