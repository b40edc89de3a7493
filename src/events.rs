//! Event bus for observing the thought process and lifecycle.
//!
//! Observers register named handlers; the orchestrator emits stage events
//! (`hear`, `listen`, `understand`, `serve`, `act`, `respond`, `remember`,
//! `match`, `nomatch`) with the current state, and the lifecycle controller
//! emits `loaded`/`started`/`shutdown` without one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::state::State;

/// An event handler. The state is present for thought-process events and
/// absent for lifecycle events.
pub type Handler = Arc<dyn Fn(&str, Option<&State>) + Send + Sync>;

/// Registry of named event handlers.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event name.
    pub fn on(&self, name: impl Into<String>, handler: Handler) {
        let mut map = self.handlers.write().unwrap();
        map.entry(name.into()).or_default().push(handler);
    }

    /// Remove all handlers for an event name.
    pub fn off(&self, name: &str) {
        let mut map = self.handlers.write().unwrap();
        map.remove(name);
    }

    /// Emit an event to its handlers. Handlers are cloned out of the
    /// registry before invocation so they may register further handlers.
    pub fn emit(&self, name: &str, state: Option<&State>) {
        let handlers: Vec<Handler> = {
            let map = self.handlers.read().unwrap();
            match map.get(name) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for handler in handlers {
            handler(name, state);
        }
    }

    /// Number of handlers registered for an event name.
    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers
            .read()
            .unwrap()
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.handlers.read().unwrap();
        write!(f, "EventBus({} events)", map.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.on(
            "listen",
            Arc::new(move |name, _state| {
                assert_eq!(name, "listen");
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.emit("listen", None);
        bus.emit("listen", None);
        bus.emit("other", None);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_off_removes_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.on(
            "match",
            Arc::new(move |_name, _state| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(bus.handler_count("match"), 1);
        bus.off("match");
        bus.emit("match", None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
