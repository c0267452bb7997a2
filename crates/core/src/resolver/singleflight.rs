//! Per-key singleflight guard.
//!
//! At most one real resolution proceeds per token at any time. The owner
//! announces completion through a `Notify`; ownership is released
//! unconditionally on drop, so no token can permanently deadlock future
//! callers even when the owner panics or is cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// Result of trying to enter a flight for a key.
pub enum Flight<'a> {
    /// This caller does the real work and must hold the guard until done.
    Owner(OwnerGuard<'a>),
    /// Someone else is already working this key; wait on the notify, then
    /// re-check the shared result.
    Waiter(Arc<Notify>),
}

/// Per-key owner table.
#[derive(Default)]
pub struct Singleflight {
    entries: Mutex<HashMap<String, Arc<Notify>>>,
}

impl Singleflight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the flight for `key`: first caller becomes the owner, later
    /// callers get the owner's notify handle.
    pub fn begin(&self, key: &str) -> Flight<'_> {
        let mut entries = self.entries.lock().expect("singleflight lock poisoned");
        if let Some(existing) = entries.get(key) {
            return Flight::Waiter(Arc::clone(existing));
        }
        let notify = Arc::new(Notify::new());
        entries.insert(key.to_string(), Arc::clone(&notify));
        Flight::Owner(OwnerGuard {
            flight: self,
            key: key.to_string(),
            notify,
        })
    }

    /// Number of in-flight keys.
    pub fn in_flight(&self) -> usize {
        self.entries.lock().expect("singleflight lock poisoned").len()
    }

    fn release(&self, key: &str, notify: &Arc<Notify>) {
        let mut entries = self.entries.lock().expect("singleflight lock poisoned");
        if let Some(current) = entries.get(key) {
            if Arc::ptr_eq(current, notify) {
                entries.remove(key);
            }
        }
        notify.notify_waiters();
    }
}

/// Held by the flight owner; releases the key and wakes waiters on drop.
pub struct OwnerGuard<'a> {
    flight: &'a Singleflight,
    key: String,
    notify: Arc<Notify>,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.flight.release(&self.key, &self.notify);
    }
}
