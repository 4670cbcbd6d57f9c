//! Typed publish/subscribe on top of the raw frame stream.
//!
//! Frames are parsed into [`Envelope`]s and handed, in registration order, to
//! the handlers registered for their `type`, after the "any message"
//! handlers. Every dispatch also goes out on a broadcast channel for
//! consumers that only want to observe.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use fixline_shared::{event_types, Envelope, EnvelopeError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use super::connection::ClientEvent;

/// Callback invoked with every matching envelope.
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Entry {
    id: HandlerId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_type: HashMap<String, Vec<Entry>>,
    any: Vec<Entry>,
}

impl Registry {
    fn allocate(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }

    fn remove(&mut self, event_type: Option<&str>, id: HandlerId) -> bool {
        match event_type {
            None => {
                let before = self.any.len();
                self.any.retain(|e| e.id != id);
                before != self.any.len()
            }
            Some(event_type) => {
                let Some(entries) = self.by_type.get_mut(event_type) else {
                    return false;
                };
                let before = entries.len();
                entries.retain(|e| e.id != id);
                let removed = before != entries.len();
                if entries.is_empty() {
                    self.by_type.remove(event_type);
                }
                removed
            }
        }
    }
}

/// Disposer returned by `subscribe`. Calling [`Subscription::unsubscribe`]
/// removes exactly this registration; dropping it leaves the handler in place.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    event_type: Option<String>,
    id: HandlerId,
}

impl Subscription {
    /// Event type this subscription listens to; `None` for the any-message channel.
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Remove the handler. Returns `false` if it was already gone (for
    /// example after the registry was cleared by a disconnect).
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.lock().remove(self.event_type.as_deref(), self.id))
    }
}

pub struct Multiplexer {
    registry: Arc<Mutex<Registry>>,
    events: broadcast::Sender<ClientEvent>,
}

impl Multiplexer {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            events,
        }
    }

    /// Register `handler` for `event_type`. Registering the same `Arc` twice
    /// for one type is a no-op that returns a disposer for the existing entry.
    pub fn subscribe(&self, event_type: &str, handler: Handler) -> Subscription {
        let mut registry = self.registry.lock();
        let existing = registry.by_type.get(event_type).and_then(|entries| {
            entries
                .iter()
                .find(|e| Arc::ptr_eq(&e.handler, &handler))
                .map(|e| e.id)
        });
        let id = match existing {
            Some(id) => id,
            None => {
                let id = registry.allocate();
                registry
                    .by_type
                    .entry(event_type.to_string())
                    .or_default()
                    .push(Entry { id, handler });
                id
            }
        };
        Subscription {
            registry: Arc::downgrade(&self.registry),
            event_type: Some(event_type.to_string()),
            id,
        }
    }

    /// Register a handler that sees every parsed envelope, whatever its type.
    pub fn subscribe_all(&self, handler: Handler) -> Subscription {
        let mut registry = self.registry.lock();
        let existing = registry
            .any
            .iter()
            .find(|e| Arc::ptr_eq(&e.handler, &handler))
            .map(|e| e.id);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = registry.allocate();
                registry.any.push(Entry { id, handler });
                id
            }
        };
        Subscription {
            registry: Arc::downgrade(&self.registry),
            event_type: None,
            id,
        }
    }

    /// Register a handler that receives the payload decoded as `T`. Payloads
    /// that do not decode are logged and skipped.
    pub fn subscribe_payload<T, F>(&self, event_type: &str, f: F) -> Subscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |envelope: &Envelope| {
            match serde_json::from_value::<T>(envelope.payload.clone()) {
                Ok(payload) => f(payload),
                Err(e) => crate::log_warn!(
                    "Ignoring {} event with unexpected payload: {}",
                    envelope.event_type,
                    e
                ),
            }
        });
        self.subscribe(event_type, handler)
    }

    /// Remove one handler (by `Arc` identity) or, with `None`, every handler
    /// for `event_type`.
    pub fn unsubscribe(&self, event_type: &str, handler: Option<&Handler>) {
        let mut registry = self.registry.lock();
        match handler {
            Some(handler) => {
                if let Some(entries) = registry.by_type.get_mut(event_type) {
                    entries.retain(|e| !Arc::ptr_eq(&e.handler, handler));
                    if entries.is_empty() {
                        registry.by_type.remove(event_type);
                    }
                }
            }
            None => {
                if registry.by_type.remove(event_type).is_some() {
                    crate::log_debug!("Unsubscribed every handler for {}", event_type);
                }
            }
        }
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let mut registry = self.registry.lock();
        registry.by_type.clear();
        registry.any.clear();
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.registry
            .lock()
            .by_type
            .get(event_type)
            .map_or(0, Vec::len)
    }

    pub fn has_entry(&self, event_type: &str) -> bool {
        self.registry.lock().by_type.contains_key(event_type)
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Publish on the broadcast channel. Having no receivers is fine.
    pub fn publish(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    /// Parse and route a text frame. Malformed frames are logged and dropped.
    pub fn dispatch_text(&self, text: &str) {
        self.dispatch_parsed(Envelope::parse(text), text.len());
    }

    /// Parse and route a binary frame holding UTF-8 JSON.
    pub fn dispatch_bytes(&self, bytes: &[u8]) {
        self.dispatch_parsed(Envelope::parse_bytes(bytes), bytes.len());
    }

    fn dispatch_parsed(&self, parsed: Result<Envelope, EnvelopeError>, len: usize) {
        match parsed {
            Ok(envelope) => self.dispatch(envelope),
            Err(e) => crate::log_warn!(
                "Dropping malformed frame ({} bytes, {}): {}",
                len,
                e.kind(),
                e
            ),
        }
    }

    /// Route a parsed envelope. Handler sets are snapshotted up front, so
    /// handlers may subscribe or unsubscribe while this runs.
    pub fn dispatch(&self, envelope: Envelope) {
        let (any, typed) = {
            let registry = self.registry.lock();
            let any: Vec<Handler> = registry.any.iter().map(|e| e.handler.clone()).collect();
            let typed: Vec<Handler> = registry
                .by_type
                .get(&envelope.event_type)
                .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
                .unwrap_or_default();
            (any, typed)
        };

        crate::log_debug!("Received event: {}", envelope.event_type);
        if typed.is_empty() && !event_types::is_known(&envelope.event_type) {
            crate::log_debug!("No handlers for unknown event type {}", envelope.event_type);
        }

        for handler in &any {
            invoke(handler, &envelope);
        }
        for handler in &typed {
            invoke(handler, &envelope);
        }

        self.publish(ClientEvent::Message(Arc::new(envelope)));
    }
}

fn invoke(handler: &Handler, envelope: &Envelope) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
        crate::log_error!(
            "Error in handler for {}: {}",
            envelope.event_type,
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
