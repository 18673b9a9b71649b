//! Change notification primitive for registered token caches
//!
//! A token cache owns one `ChangeEvent`; the persistence component
//! subscribes to it and persists the cache whenever it fires. Listeners run
//! outside the registry lock so a listener may subscribe or unsubscribe
//! without deadlocking, and a panicking listener never takes the event (or
//! the other listeners) down with it.

use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Identifier handed out by [`ChangeEvent::subscribe`]
pub type SubscriptionId = u64;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

/// A thread-safe, multi-listener change event
#[derive(Default)]
pub struct ChangeEvent {
    registry: Mutex<Registry>,
}

impl ChangeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, returning the id needed to remove it again
    pub fn subscribe(&self, listener: Box<dyn Fn() + Send + Sync>) -> SubscriptionId {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push((id, Arc::from(listener)));
        id
    }

    /// Remove a listener; unknown ids are ignored
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.lock().listeners.retain(|(sid, _)| *sid != id);
    }

    /// Invoke every registered listener
    pub fn notify(&self) {
        // Snapshot under the lock, invoke outside it.
        let listeners: Vec<Listener> = self
            .registry
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                tracing::error!("change-event listener panicked; continuing with remaining listeners");
            }
        }
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

impl fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn notify_reaches_every_listener() {
        let event = ChangeEvent::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            event.subscribe(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }

        event.notify();
        event.notify();
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn unsubscribed_listener_stops_firing() {
        let event = ChangeEvent::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let id = event.subscribe(Box::new(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        event.notify();
        event.unsubscribe(id);
        event.notify();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_unknown_id_is_noop() {
        let event = ChangeEvent::new();
        event.unsubscribe(42);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_does_not_poison_event() {
        let event = ChangeEvent::new();
        let hits = Arc::new(AtomicUsize::new(0));

        event.subscribe(Box::new(|| panic!("listener failure")));
        let hits_clone = Arc::clone(&hits);
        event.subscribe(Box::new(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        event.notify();
        event.notify();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_may_subscribe_during_notify() {
        let event = Arc::new(ChangeEvent::new());
        let event_clone = Arc::clone(&event);

        event.subscribe(Box::new(move || {
            event_clone.subscribe(Box::new(|| {}));
        }));

        event.notify();
        assert_eq!(event.listener_count(), 2);
    }
}
