//! Connection-time gating of host-pushed events
//!
//! Events are refused before a connection attempt, queued while it is in
//! flight, and delivered directly once it succeeds. The queue drains only
//! after the connect hook has run, so handlers registered there see every
//! event.

use super::processor::Responder;
use crate::error::LabError;
use crate::host::HostEventHandler;
use crate::lock;
use crate::protocol::Command;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const REJECTED_BEFORE_CONNECTION: &str = "Message received prior to connection";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Reject,
    Collecting,
    Firing,
}

struct Inner {
    state: GateState,
    queue: VecDeque<(Command, Responder)>,
}

pub struct EventGate {
    inner: Mutex<Inner>,
    handlers: Mutex<Vec<HostEventHandler>>,
}

impl Default for EventGate {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: GateState::Reject,
                queue: VecDeque::new(),
            }),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> GateState {
        lock(&self.inner).state
    }

    pub fn on(&self, handler: HostEventHandler) {
        lock(&self.handlers).push(handler);
    }

    /// A connection attempt has started
    pub fn begin_collecting(&self) {
        lock(&self.inner).state = GateState::Collecting;
    }

    /// Back to refusing events. Anything still queued is refused too.
    pub fn reject(&self) {
        let queued = {
            let mut inner = lock(&self.inner);
            inner.state = GateState::Reject;
            std::mem::take(&mut inner.queue)
        };
        for (_, responder) in queued {
            responder.respond(Err(json!({ "message": REJECTED_BEFORE_CONNECTION })));
        }
    }

    /// Route one inbound event according to the current state
    pub fn accept(&self, command: Command, responder: Responder) {
        let mut inner = lock(&self.inner);
        match inner.state {
            GateState::Reject => {
                drop(inner);
                tracing::debug!(event = %command.command_type, "Event refused before connection");
                responder.respond(Err(json!({ "message": REJECTED_BEFORE_CONNECTION })));
            }
            GateState::Collecting => {
                tracing::debug!(event = %command.command_type, "Event deferred until connected");
                inner.queue.push_back((command, responder));
            }
            GateState::Firing => {
                drop(inner);
                self.invoke(&command, responder);
            }
        }
    }

    /// The connection attempt finished. Deferred events are delivered in
    /// arrival order (or refused with the connect error), then the gate
    /// switches to Firing or back to Reject.
    pub fn settle(&self, outcome: Result<(), &LabError>) {
        loop {
            let batch = {
                let mut inner = lock(&self.inner);
                if inner.queue.is_empty() {
                    inner.state = if outcome.is_ok() {
                        GateState::Firing
                    } else {
                        GateState::Reject
                    };
                    return;
                }
                std::mem::take(&mut inner.queue)
            };

            for (command, responder) in batch {
                match outcome {
                    Ok(()) => self.invoke(&command, responder),
                    Err(e) => responder.respond(Err(e.to_failure_payload())),
                }
            }
        }
    }

    fn invoke(&self, command: &Command, responder: Responder) {
        let handlers = lock(&self.handlers).clone();
        tracing::debug!(event = %command.command_type, handlers = handlers.len(), "Firing event");
        for handler in handlers {
            handler(&command.command_type, &command.command_data);
        }
        responder.respond(Ok(Value::Null));
    }
}
