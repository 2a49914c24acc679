use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

/// Subject every online player hears.
pub const WORLD_SUBJECT: &str = "world";

pub fn player_subject(player: impl fmt::Display) -> String {
    format!("player-{player}")
}

pub fn zone_subject(zone: impl fmt::Display) -> String {
    format!("zone-{zone}")
}

pub fn room_subject(zone: impl fmt::Display, room: impl fmt::Display) -> String {
    format!("zone-{zone}-room-{room}")
}

/// Callback invoked with the payload of every message published to a subject.
pub type Handler = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("subscribe to '{subject}' failed: {reason}")]
    Subscribe { subject: String, reason: String },

    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },
}

/// Named-channel message delivery. Payloads are opaque bytes.
pub trait PubSub: Send + Sync {
    fn subscribe(&self, subject: &str, handler: Handler) -> Result<Subscription, PubSubError>;

    fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), PubSubError>;
}

/// Handle to an active subscription. Unsubscribes on `unsubscribe()` or drop.
pub struct Subscription {
    subject: String,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(subject: impl Into<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            subject: subject.into(),
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subjects: HashMap<String, Vec<(u64, Handler)>>,
}

/// In-process pub/sub bus with independent handler lists per subject.
#[derive(Clone, Default)]
pub struct LocalBus {
    registry: Arc<RwLock<Registry>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live handlers on a subject.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.registry
            .read()
            .map(|reg| reg.subjects.get(subject).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

fn remove_handler(registry: &Weak<RwLock<Registry>>, subject: &str, id: u64) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let Ok(mut reg) = registry.write() else {
        return;
    };
    if let Some(handlers) = reg.subjects.get_mut(subject) {
        handlers.retain(|(hid, _)| *hid != id);
        if handlers.is_empty() {
            reg.subjects.remove(subject);
        }
    }
}

impl PubSub for LocalBus {
    fn subscribe(&self, subject: &str, handler: Handler) -> Result<Subscription, PubSubError> {
        let mut reg = self.registry.write().map_err(|_| PubSubError::Subscribe {
            subject: subject.to_string(),
            reason: "registry lock poisoned".to_string(),
        })?;
        let id = reg.next_id;
        reg.next_id += 1;
        reg.subjects
            .entry(subject.to_string())
            .or_default()
            .push((id, handler));
        drop(reg);

        tracing::trace!(subject, id, "subscribed");
        let weak = Arc::downgrade(&self.registry);
        let owned_subject = subject.to_string();
        Ok(Subscription::new(subject, move || {
            remove_handler(&weak, &owned_subject, id);
        }))
    }

    fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), PubSubError> {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<Handler> = {
            let reg = self.registry.read().map_err(|_| PubSubError::Publish {
                subject: subject.to_string(),
                reason: "registry lock poisoned".to_string(),
            })?;
            match reg.subjects.get(subject) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return Ok(()),
            }
        };
        for handler in handlers {
            handler(payload);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collector() -> (Handler, Arc<Mutex<Vec<Vec<u8>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Handler = Arc::new(move |payload: &[u8]| {
            sink.lock().unwrap().push(payload.to_vec());
        });
        (handler, seen)
    }

    #[test]
    fn subject_names() {
        assert_eq!(player_subject("kael"), "player-kael");
        assert_eq!(zone_subject("town"), "zone-town");
        assert_eq!(room_subject("town", "square"), "zone-town-room-square");
    }

    #[test]
    fn publish_reaches_subscribers() {
        let bus = LocalBus::new();
        let (h1, seen1) = collector();
        let (h2, seen2) = collector();
        let _s1 = bus.subscribe("zone-town", h1).unwrap();
        let _s2 = bus.subscribe("zone-town", h2).unwrap();

        bus.publish("zone-town", b"hello").unwrap();

        assert_eq!(seen1.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
        assert_eq!(seen2.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
    }

    #[test]
    fn independent_subjects() {
        let bus = LocalBus::new();
        let (h, seen) = collector();
        let _s = bus.subscribe("zone-a", h).unwrap();

        bus.publish("zone-b", b"elsewhere").unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = LocalBus::new();
        assert!(bus.publish("nobody", b"x").is_ok());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = LocalBus::new();
        let (h, seen) = collector();
        let sub = bus.subscribe("world", h).unwrap();
        assert_eq!(bus.subscriber_count("world"), 1);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count("world"), 0);

        bus.publish("world", b"gone").unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn drop_unsubscribes() {
        let bus = LocalBus::new();
        let (h, _seen) = collector();
        {
            let _sub = bus.subscribe("world", h).unwrap();
            assert_eq!(bus.subscriber_count("world"), 1);
        }
        assert_eq!(bus.subscriber_count("world"), 0);
    }

    #[test]
    fn handler_may_unsubscribe_during_publish() {
        let bus = LocalBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let handler: Handler = Arc::new(move |_: &[u8]| {
            inner.lock().unwrap().take();
        });
        let sub = bus.subscribe("once", handler).unwrap();
        *slot.lock().unwrap() = Some(sub);

        bus.publish("once", b"first").unwrap();
        assert_eq!(bus.subscriber_count("once"), 0);
    }

    #[test]
    fn subscription_outlives_bus() {
        let bus = LocalBus::new();
        let (h, _seen) = collector();
        let sub = bus.subscribe("world", h).unwrap();
        drop(bus);
        sub.unsubscribe();
    }
}
