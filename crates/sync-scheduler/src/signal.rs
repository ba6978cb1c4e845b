//! The global "syncing" flag.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::error;

/// Handle returned by [`SyncSignal::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct Observers {
    next_id: u64,
    callbacks: BTreeMap<u64, Observer>,
}

/// Boolean publish/subscribe signal, `true` while a sync is running.
///
/// Async consumers use [`subscribe`](Self::subscribe). Callback observers
/// receive the current value on attach and every change after that, in
/// order. Callbacks run on the writer's thread with the observer list
/// locked, so they must not attach or detach observers themselves. A
/// panicking callback is logged and does not reach the writer.
pub struct SyncSignal {
    tx: watch::Sender<bool>,
    observers: Mutex<Observers>,
}

impl Default for SyncSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx,
            observers: Mutex::new(Observers::default()),
        }
    }

    pub fn get(&self) -> bool {
        *self.tx.borrow()
    }

    /// Set the value, notifying observers only when it changes.
    pub(crate) fn set(&self, value: bool) {
        let observers = self.lock();
        let changed = self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });

        if changed {
            for (id, callback) in &observers.callbacks {
                notify(*id, callback, value);
            }
        }
    }

    /// Receiver for async consumers.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Attach a callback. It is called right away with the current value.
    pub fn observe<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut observers = self.lock();
        let id = observers.next_id;
        observers.next_id += 1;

        let callback: Observer = Arc::new(callback);
        notify(id, &callback, self.get());
        observers.callbacks.insert(id, callback);
        ObserverId(id)
    }

    /// Detach a callback. Returns false if it was not attached.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.lock().callbacks.remove(&id.0).is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.lock().callbacks.len()
    }

    fn lock(&self) -> MutexGuard<'_, Observers> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn notify(id: u64, callback: &Observer, value: bool) {
    if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
        error!(observer_id = id, syncing = value, "Sync signal observer panicked");
    }
}

impl std::fmt::Debug for SyncSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSignal")
            .field("value", &self.get())
            .field("observers", &self.observer_count())
            .finish()
    }
}
