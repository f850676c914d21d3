//! Named event handlers

use crate::lock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Token returned by [`EventManager::add`], used to remove the handler again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
}

/// Cheap to clone; clones share the same handler table.
#[derive(Clone, Default)]
pub struct EventManager {
    inner: Arc<Registry>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.handlers)
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Returns whether a handler was removed
    pub fn remove(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = lock(&self.inner.handlers);
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Call every handler for `event` in registration order. Handlers may
    /// add or remove handlers; changes apply from the next fire.
    pub fn fire(&self, event: &str, data: &Value) {
        let handlers: Vec<EventHandler> = lock(&self.inner.handlers)
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        tracing::debug!(event, handlers = handlers.len(), "Firing session event");
        for handler in handlers {
            handler(data);
        }
    }

    pub fn handler_count(&self, event: &str) -> usize {
        lock(&self.inner.handlers).get(event).map_or(0, Vec::len)
    }
}
