//! One-way message channel between script contexts
//!
//! A [`Channel`] is fire-and-forget: posting never waits for the other side
//! and carries no reply. Correlation lives in the transport layer above.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

/// Identifies one context attached to a channel (the "origin" of a message)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ContextId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// An inbound message together with the context it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub source: ContextId,
    pub data: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Context {0} is not reachable")]
    Unavailable(ContextId),
    #[error("Context {0} is already subscribed")]
    AlreadySubscribed(ContextId),
}

/// Adapter over whatever carries serialized envelopes between contexts
pub trait Channel: Send + Sync {
    /// The context this end of the channel speaks for
    fn local(&self) -> &ContextId;

    /// Post serialized data to `target`. Fails immediately when the target
    /// cannot be reached; success says nothing about processing.
    fn post(&self, target: &ContextId, data: String) -> Result<(), ChannelError>;

    /// Start receiving messages addressed to [`Channel::local`]
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Delivery>, ChannelError>;

    /// Stop receiving. Pending deliveries are discarded.
    fn unsubscribe(&self);
}

impl<T: Channel + ?Sized> Channel for Arc<T> {
    fn local(&self) -> &ContextId {
        (**self).local()
    }

    fn post(&self, target: &ContextId, data: String) -> Result<(), ChannelError> {
        (**self).post(target, data)
    }

    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Delivery>, ChannelError> {
        (**self).subscribe()
    }

    fn unsubscribe(&self) {
        (**self).unsubscribe();
    }
}

// ============================================================================
// In-process bus
// ============================================================================

type Routes = HashMap<ContextId, mpsc::UnboundedSender<Delivery>>;

/// In-process router connecting any number of contexts. Preserves per-sender
/// ordering.
#[derive(Clone, Default)]
pub struct MemoryBus {
    routes: Arc<Mutex<Routes>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the channel end for `id`. Nothing is routed to it until it
    /// subscribes.
    pub fn endpoint(&self, id: impl Into<ContextId>) -> MemoryEndpoint {
        MemoryEndpoint {
            bus: self.clone(),
            local: id.into(),
        }
    }

    fn with_routes<R>(&self, f: impl FnOnce(&mut Routes) -> R) -> R {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut routes)
    }
}

/// One context's view of a [`MemoryBus`]
#[derive(Clone)]
pub struct MemoryEndpoint {
    bus: MemoryBus,
    local: ContextId,
}

impl Channel for MemoryEndpoint {
    fn local(&self) -> &ContextId {
        &self.local
    }

    fn post(&self, target: &ContextId, data: String) -> Result<(), ChannelError> {
        let delivery = Delivery {
            source: self.local.clone(),
            data,
        };
        self.bus.with_routes(|routes| {
            let Some(tx) = routes.get(target) else {
                return Err(ChannelError::Unavailable(target.clone()));
            };
            if tx.send(delivery).is_err() {
                routes.remove(target);
                return Err(ChannelError::Unavailable(target.clone()));
            }
            Ok(())
        })
    }

    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Delivery>, ChannelError> {
        self.bus.with_routes(|routes| {
            if routes.get(&self.local).is_some_and(|tx| !tx.is_closed()) {
                return Err(ChannelError::AlreadySubscribed(self.local.clone()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            routes.insert(self.local.clone(), tx);
            Ok(rx)
        })
    }

    fn unsubscribe(&self) {
        self.bus.with_routes(|routes| {
            routes.remove(&self.local);
        });
    }
}
