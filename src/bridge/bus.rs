//! Typed event bus with a bounded history.
//!
//! `emit` appends to a fixed-capacity ring buffer (oldest dropped first)
//! and then synchronously calls every matching handler in registration
//! order. Handlers only see `&BridgeEvent`, so they cannot re-enter the bus.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::events::{BridgeEvent, EventKind, EventPayload, EventPriority};
use crate::callback::call_guarded;

// ---------------------------------------------------------------------------
// Handler types
// ---------------------------------------------------------------------------

pub type EventHandler = Arc<dyn Fn(&BridgeEvent) + Send + Sync>;

/// Identifies a registered handler for [`EventBus::off`].
#[derive(Clone)]
pub struct HandlerId {
    pub name: String,
    id: u64,
}

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({}:{})", self.id, self.name)
    }
}

impl PartialEq for HandlerId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for HandlerId {}

impl std::hash::Hash for HandlerId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

static HANDLER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl HandlerId {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: HANDLER_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
struct HandlerEntry {
    id: HandlerId,
    /// `None` subscribes to every kind.
    kind: Option<EventKind>,
    handler: EventHandler,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

pub struct EventBus {
    handlers: Vec<HandlerEntry>,
    history: VecDeque<BridgeEvent>,
    capacity: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .field("history", &self.history.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            handlers: Vec::new(),
            history: VecDeque::new(),
            capacity,
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a handler for one event kind.
    pub fn on(
        &mut self,
        kind: EventKind,
        name: impl Into<String>,
        handler: impl Fn(&BridgeEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(Some(kind), name, Arc::new(handler))
    }

    /// Register a handler for every event kind.
    pub fn on_any(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&BridgeEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(None, name, Arc::new(handler))
    }

    /// Unregister a handler. Returns `false` if it was not registered.
    pub fn off(&mut self, handler_id: &HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|e| e.id != *handler_id);
        self.handlers.len() != before
    }

    /// Handlers that would receive an event of `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .iter()
            .filter(|e| e.kind.map_or(true, |k| k == kind))
            .count()
    }

    fn register(
        &mut self,
        kind: Option<EventKind>,
        name: impl Into<String>,
        handler: EventHandler,
    ) -> HandlerId {
        let id = HandlerId::new(name);
        self.handlers.push(HandlerEntry {
            id: id.clone(),
            kind,
            handler,
        });
        id
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    /// Record an event and dispatch it. Returns the stored event.
    pub fn emit(
        &mut self,
        payload: EventPayload,
        priority: EventPriority,
        timestamp_ms: u64,
    ) -> BridgeEvent {
        let event = BridgeEvent::new(payload, priority, timestamp_ms);
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());

        let kind = event.kind();
        for entry in self.handlers.iter().filter(|e| e.kind.map_or(true, |k| k == kind)) {
            let handler = entry.handler.clone();
            call_guarded("EventBus", &entry.id.name, || handler(&event));
        }
        event
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Stored events, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &BridgeEvent> {
        self.history.iter()
    }

    /// The newest `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&BridgeEvent> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).collect()
    }

    pub fn last(&self) -> Option<&BridgeEvent> {
        self.history.back()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
