//! Request/response correlation over a one-way [`Channel`]

use crate::channel::{Channel, ContextId, Delivery};
use crate::error::{LabError, LabResult};
use crate::lock;
use crate::protocol::{Envelope, MessageKind};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Receives inbound requests. Called from the processor's dispatch task, one
/// message at a time, in arrival order.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, origin: ContextId, payload: Value, responder: Responder);
}

/// Reply slot for one inbound request
#[must_use = "every inbound request expects a reply"]
pub struct Responder {
    channel: Arc<dyn Channel>,
    origin: ContextId,
    session_id: String,
    id: u64,
}

impl Responder {
    pub fn origin(&self) -> &ContextId {
        &self.origin
    }

    /// Send the reply. A failed post is logged; the requester never learns
    /// about it.
    pub fn respond(self, outcome: Result<Value, Value>) {
        let (kind, payload) = match outcome {
            Ok(payload) => (MessageKind::Completion, payload),
            Err(payload) => (MessageKind::Failure, payload),
        };
        let envelope = Envelope {
            id: self.id,
            session_id: self.session_id,
            kind,
            payload,
        };

        let data = match serde_json::to_string(&envelope) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(id = envelope.id, error = %e, "Failed to encode reply");
                return;
            }
        };
        if let Err(e) = self.channel.post(&self.origin, data) {
            tracing::warn!(id = envelope.id, origin = %self.origin, error = %e, "Failed to post reply");
        }
    }

    /// Reply with the outcome of a local operation
    pub fn respond_with(self, outcome: LabResult<Value>) {
        self.respond(outcome.map_err(|e| e.to_failure_payload()));
    }
}

struct Pending {
    target: ContextId,
    reply: oneshot::Sender<LabResult<Value>>,
}

struct Shared {
    session_id: String,
    channel: Arc<dyn Channel>,
    handler: Arc<dyn MessageHandler>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Pending>>,
}

impl Shared {
    fn dispatch(&self, delivery: Delivery) {
        let envelope: Envelope = match serde_json::from_str(&delivery.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(source = %delivery.source, error = %e, "Ignoring unparseable message");
                return;
            }
        };
        if envelope.session_id != self.session_id {
            tracing::debug!(
                session_id = %envelope.session_id,
                "Ignoring message for another session"
            );
            return;
        }

        match envelope.kind {
            MessageKind::Message => {
                tracing::debug!(id = envelope.id, origin = %delivery.source, "Inbound request");
                let responder = Responder {
                    channel: Arc::clone(&self.channel),
                    origin: delivery.source.clone(),
                    session_id: self.session_id.clone(),
                    id: envelope.id,
                };
                self.handler.on_message(delivery.source, envelope.payload, responder);
            }
            MessageKind::Completion | MessageKind::Failure => {
                let Some(pending) = lock(&self.pending).remove(&envelope.id) else {
                    tracing::debug!(id = envelope.id, "Dropping reply to unknown request");
                    return;
                };
                // The entry is consumed either way; a foreign reply never completes it
                if pending.target != delivery.source {
                    tracing::warn!(
                        id = envelope.id,
                        expected = %pending.target,
                        origin = %delivery.source,
                        "Dropping reply from unexpected origin"
                    );
                    return;
                }

                let outcome = if envelope.kind == MessageKind::Completion {
                    Ok(envelope.payload)
                } else {
                    Err(LabError::from_failure_payload(&envelope.payload))
                };
                // Requester may have gone away; nothing to do then
                let _ = pending.reply.send(outcome);
            }
        }
    }

    fn fail_pending(&self) {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        for (id, pending) in drained {
            tracing::debug!(id, "Failing request pending at shutdown");
            let _ = pending.reply.send(Err(LabError::Disconnected));
        }
    }
}

/// Correlates outbound requests with their replies and hands inbound
/// requests to a [`MessageHandler`].
pub struct MessageProcessor {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MessageProcessor {
    pub fn new(
        session_id: impl Into<String>,
        channel: Arc<dyn Channel>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                session_id: session_id.into(),
                channel,
                handler,
                next_id: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn local(&self) -> &ContextId {
        self.shared.channel.local()
    }

    pub fn is_started(&self) -> bool {
        lock(&self.task).is_some()
    }

    /// Subscribe to the channel and start dispatching. Must be running on a
    /// tokio runtime.
    pub fn start(&self) -> LabResult<()> {
        let mut task = lock(&self.task);
        if task.is_some() {
            return Err(LabError::AlreadyStarted);
        }

        let mut inbox = self.shared.channel.subscribe()?;
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(async move {
            while let Some(delivery) = inbox.recv().await {
                shared.dispatch(delivery);
            }
        }));

        tracing::debug!(local = %self.local(), session_id = %self.shared.session_id, "Processor started");
        Ok(())
    }

    /// Unsubscribe and fail every request still waiting for a reply
    pub fn stop(&self) -> LabResult<()> {
        let task = lock(&self.task).take().ok_or(LabError::NotStarted)?;
        task.abort();
        self.shared.channel.unsubscribe();
        self.shared.fail_pending();

        tracing::debug!(local = %self.local(), "Processor stopped");
        Ok(())
    }

    /// Send `payload` to `target` and wait for the correlated reply. A reply
    /// from any other context consumes the request, which then fails with
    /// [`LabError::Disconnected`].
    pub async fn request(&self, target: &ContextId, payload: Value) -> LabResult<Value> {
        if !self.is_started() {
            return Err(LabError::NotStarted);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let data = serde_json::to_string(&Envelope {
            id,
            session_id: self.shared.session_id.clone(),
            kind: MessageKind::Message,
            payload,
        })?;

        let (tx, rx) = oneshot::channel();
        // Registered before posting so an immediate reply finds its entry
        lock(&self.shared.pending).insert(
            id,
            Pending {
                target: target.clone(),
                reply: tx,
            },
        );

        if let Err(e) = self.shared.channel.post(target, data) {
            lock(&self.shared.pending).remove(&id);
            tracing::warn!(id, peer = %target, error = %e, "Request could not be delivered");
            return Err(e.into());
        }

        tracing::debug!(id, peer = %target, "Request sent");
        rx.await.map_err(|_| LabError::Disconnected)?
    }
}

impl Drop for MessageProcessor {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
            self.shared.channel.unsubscribe();
        }
    }
}
