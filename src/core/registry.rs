use std::sync::{Arc, Mutex, MutexGuard, Weak};

use unidl_core::models::message::ServerMessage;

type Handler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

#[derive(Default)]
struct Slots {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// Fan-out list of message handlers. Every handler sees every message and
/// filters for itself.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    slots: Arc<Mutex<Slots>>,
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        let mut slots = lock(&self.slots);
        let id = slots.next_id;
        slots.next_id += 1;
        slots.handlers.push((id, Arc::new(handler)));
        Subscription {
            id,
            slots: Arc::downgrade(&self.slots),
            released: false,
        }
    }

    /// Calls every handler registered when dispatch starts. The lock is not
    /// held while handlers run, so they may subscribe or unsubscribe freely.
    pub fn dispatch(&self, message: &ServerMessage) {
        let snapshot: Vec<Handler> = lock(&self.slots)
            .handlers
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in snapshot {
            handler(message);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a handler registered. Dropping it removes the handler.
pub struct Subscription {
    id: u64,
    slots: Weak<Mutex<Slots>>,
    released: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(slots) = self.slots.upgrade() {
            lock(&slots).handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn other(kind: &str) -> ServerMessage {
        ServerMessage::Other { kind: kind.into() }
    }

    #[test]
    fn every_handler_sees_every_message() {
        let registry = SubscriptionRegistry::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let (ca, cb) = (a.clone(), b.clone());
        let _sa = registry.subscribe(move |_| {
            ca.fetch_add(1, Ordering::SeqCst);
        });
        let _sb = registry.subscribe(move |_| {
            cb.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&other("x"));
        registry.dispatch(&other("y"));
        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_removes_handler() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = registry.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.len(), 1);
        drop(sub);
        assert!(registry.is_empty());
        registry.dispatch(&other("x"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_can_unsubscribe_another_during_dispatch() {
        let registry = SubscriptionRegistry::new();
        let victim_hits = Arc::new(AtomicUsize::new(0));
        let victim_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot = victim_slot.clone();
        let _killer = registry.subscribe(move |_| {
            if let Some(sub) = slot.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        let vh = victim_hits.clone();
        *victim_slot.lock().unwrap() = Some(registry.subscribe(move |_| {
            vh.fetch_add(1, Ordering::SeqCst);
        }));

        // The victim was in the snapshot, so it still sees this message.
        registry.dispatch(&other("first"));
        assert_eq!(victim_hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);

        registry.dispatch(&other("second"));
        assert_eq!(victim_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_can_subscribe_during_dispatch() {
        let registry = SubscriptionRegistry::new();
        let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
        let late_hits = Arc::new(AtomicUsize::new(0));

        let reg = registry.clone();
        let added_c = added.clone();
        let late = late_hits.clone();
        let _adder = registry.subscribe(move |_| {
            let late = late.clone();
            let sub = reg.subscribe(move |_| {
                late.fetch_add(1, Ordering::SeqCst);
            });
            added_c.lock().unwrap().push(sub);
        });

        registry.dispatch(&other("x"));
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 2);

        registry.dispatch(&other("y"));
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_after_registry_is_gone_is_harmless() {
        let registry = SubscriptionRegistry::new();
        let sub = registry.subscribe(|_| {});
        drop(registry);
        sub.unsubscribe();
    }
}
