//! Host side of the transport
//!
//! A [`HostServer`] accepts a Connect from any origin, binds to it, and
//! serves every later command only to that origin. Commands run one at a
//! time, in arrival order, on a single worker task.

use super::processor::{MessageHandler, MessageProcessor, Responder};
use crate::channel::{Channel, ContextId};
use crate::error::{LabError, LabResult};
use crate::host::{InMemoryLabHost, LabHost};
use crate::lock;
use crate::model::{Action, ActionQuery, ActionRequest, Configuration, ConfigurationInstance};
use crate::protocol::{
    event_types, Command, CommandType, ConnectionResponse, HostVersionInfo, LabMode,
    ModeChangedData, SendMessageCommandData, TakeActionCommandData,
};
use async_trait::async_trait;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Host-side implementation of every lab command
#[async_trait]
pub trait LabEventProcessor: Send + Sync {
    async fn handle_connect(&self, version: HostVersionInfo) -> LabResult<ConnectionResponse>;
    async fn handle_disconnect(&self, completion: Value) -> LabResult<()>;
    async fn handle_create(&self, options: Value) -> LabResult<()>;
    async fn handle_get_configuration(&self) -> LabResult<Option<Configuration>>;
    async fn handle_set_configuration(&self, configuration: Configuration) -> LabResult<()>;
    async fn handle_get_configuration_instance(&self) -> LabResult<Option<ConfigurationInstance>>;
    async fn handle_take_action(&self, data: TakeActionCommandData) -> LabResult<Action>;
    async fn handle_get_actions(&self, query: ActionQuery) -> LabResult<Vec<Action>>;
    async fn handle_get_state(&self) -> LabResult<Option<Value>>;
    async fn handle_set_state(&self, state: Value) -> LabResult<()>;
    async fn handle_send_message(&self, data: SendMessageCommandData) -> LabResult<Value>;
}

// ============================================================================
// Ledger-backed processor
// ============================================================================

/// Serves commands from a local ledger through an [`InMemoryLabHost`]
pub struct LedgerProcessor {
    host: InMemoryLabHost,
}

impl LedgerProcessor {
    pub fn new(host: InMemoryLabHost) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &InMemoryLabHost {
        &self.host
    }
}

#[async_trait]
impl LabEventProcessor for LedgerProcessor {
    async fn handle_connect(&self, version: HostVersionInfo) -> LabResult<ConnectionResponse> {
        tracing::debug!(major = version.version.major, minor = version.version.minor, "Lab connecting");
        self.host
            .connect(&[version], Box::new(|_: Result<&ConnectionResponse, &LabError>| {}))
            .await
    }

    async fn handle_disconnect(&self, _completion: Value) -> LabResult<()> {
        self.host.disconnect().await
    }

    async fn handle_create(&self, options: Value) -> LabResult<()> {
        self.host.create(options).await
    }

    async fn handle_get_configuration(&self) -> LabResult<Option<Configuration>> {
        self.host.get_configuration().await
    }

    async fn handle_set_configuration(&self, configuration: Configuration) -> LabResult<()> {
        self.host.set_configuration(configuration).await
    }

    async fn handle_get_configuration_instance(&self) -> LabResult<Option<ConfigurationInstance>> {
        self.host.get_configuration_instance().await
    }

    async fn handle_take_action(&self, data: TakeActionCommandData) -> LabResult<Action> {
        let request = ActionRequest::from_parts(data.action_type, data.options)?;
        if data.result.is_null() {
            self.host.take_action(request).await
        } else {
            self.host.take_completed_action(request, data.result).await
        }
    }

    async fn handle_get_actions(&self, query: ActionQuery) -> LabResult<Vec<Action>> {
        self.host.get_actions(&query).await
    }

    async fn handle_get_state(&self) -> LabResult<Option<Value>> {
        self.host.get_state().await
    }

    async fn handle_set_state(&self, state: Value) -> LabResult<()> {
        self.host.set_state(state).await
    }

    async fn handle_send_message(&self, data: SendMessageCommandData) -> LabResult<Value> {
        self.host.send_message(&data.message_type, data.options).await
    }
}

// ============================================================================
// Server
// ============================================================================

struct Inbound {
    origin: ContextId,
    payload: Value,
    responder: Responder,
}

/// Hands inbound requests to the worker queue
struct QueueHandler {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl MessageHandler for QueueHandler {
    fn on_message(&self, origin: ContextId, payload: Value, responder: Responder) {
        if let Err(mpsc::error::SendError(inbound)) = self.tx.send(Inbound {
            origin,
            payload,
            responder,
        }) {
            inbound.responder.respond_with(Err(LabError::Disconnected));
        }
    }
}

#[derive(Default)]
struct Connection {
    origin: Option<ContextId>,
    active: bool,
    mode: Option<LabMode>,
}

struct Worker {
    processor: Arc<MessageProcessor>,
    events: Arc<dyn LabEventProcessor>,
    connection: Arc<Mutex<Connection>>,
}

fn decode<T: DeserializeOwned>(data: Value) -> LabResult<T> {
    serde_json::from_value(data).map_err(|e| LabError::invalid_payload(e.to_string()))
}

fn encode<T: Serialize>(value: LabResult<T>) -> LabResult<Value> {
    Ok(serde_json::to_value(value?)?)
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(inbound) = rx.recv().await {
            self.handle(inbound).await;
        }
    }

    async fn handle(&self, inbound: Inbound) {
        let Inbound {
            origin,
            payload,
            responder,
        } = inbound;

        let command: Command = match decode(payload) {
            Ok(command) => command,
            Err(e) => {
                responder.respond_with(Err(e));
                return;
            }
        };
        let kind = command.kind();

        let bound = lock(&self.connection).origin.as_ref() == Some(&origin);
        let outcome = if kind == Some(CommandType::Connect) {
            // A connect may come from a new frame
            match decode::<HostVersionInfo>(command.command_data) {
                Ok(version) => encode(self.events.handle_connect(version).await),
                Err(e) => Err(e),
            }
        } else if !bound {
            Err(LabError::NotConnected)
        } else {
            self.dispatch(kind, command).await
        };

        let succeeded = outcome.is_ok();
        if let Err(e) = &outcome {
            tracing::warn!(origin = %origin, error = %e, "Command failed");
        }
        responder.respond_with(outcome);

        if !succeeded {
            return;
        }
        match kind {
            Some(CommandType::Connect) => {
                let (active, mode) = {
                    let mut connection = lock(&self.connection);
                    connection.origin = Some(origin.clone());
                    (connection.active, connection.mode)
                };
                tracing::info!(origin = %origin, "Lab connected");
                let mut events = vec![activation_event(active)];
                events.extend(mode.map(mode_event));
                push_events(&self.processor, &origin, events);
            }
            Some(CommandType::Disconnect) => {
                lock(&self.connection).origin = None;
                tracing::info!(origin = %origin, "Lab disconnected");
            }
            _ => {}
        }
    }

    async fn dispatch(&self, kind: Option<CommandType>, command: Command) -> LabResult<Value> {
        let data = command.command_data;
        match kind {
            Some(CommandType::Disconnect) => encode(self.events.handle_disconnect(data).await),
            Some(CommandType::Create) => encode(self.events.handle_create(data).await),
            Some(CommandType::GetConfigurationInstance) => {
                encode(self.events.handle_get_configuration_instance().await)
            }
            Some(CommandType::TakeAction) => {
                encode(self.events.handle_take_action(decode(data)?).await)
            }
            Some(CommandType::GetCompletedActions) => {
                encode(self.events.handle_get_actions(decode(data)?).await)
            }
            Some(CommandType::GetState) => encode(self.events.handle_get_state().await),
            Some(CommandType::SetState) => encode(self.events.handle_set_state(data).await),
            Some(CommandType::GetConfiguration) => {
                encode(self.events.handle_get_configuration().await)
            }
            Some(CommandType::SetConfiguration) => {
                encode(self.events.handle_set_configuration(decode(data)?).await)
            }
            Some(CommandType::SendMessage) => {
                encode(self.events.handle_send_message(decode(data)?).await)
            }
            Some(CommandType::Connect | CommandType::ModeChanged) | None => {
                Err(LabError::UnknownCommand(command.command_type))
            }
        }
    }
}

fn activation_event(active: bool) -> Command {
    let name = if active {
        event_types::ACTIVATE
    } else {
        event_types::DEACTIVATE
    };
    Command::event(name, Value::Null)
}

fn mode_event(mode: LabMode) -> Command {
    Command::event(
        event_types::MODE_CHANGED,
        serde_json::to_value(ModeChangedData { mode }).unwrap_or(Value::Null),
    )
}

/// Fire-and-forget event push; the lab's acknowledgement is only logged
/// Post `events` to `target` in order from one task. Every event is sent
/// before any acknowledgement is awaited.
fn push_events(processor: &Arc<MessageProcessor>, target: &ContextId, events: Vec<Command>) {
    let processor = Arc::clone(processor);
    let target = target.clone();
    tokio::spawn(async move {
        let requests = events.into_iter().map(|event| {
            let processor = &processor;
            let target = &target;
            async move {
                let name = event.command_type.clone();
                let payload = match serde_json::to_value(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(event = %name, error = %e, "Failed to encode event");
                        return;
                    }
                };
                if let Err(e) = processor.request(target, payload).await {
                    tracing::warn!(event = %name, peer = %target, error = %e, "Event not acknowledged");
                }
            }
        });
        join_all(requests).await;
    });
}

pub struct HostServer {
    processor: Arc<MessageProcessor>,
    events: Arc<dyn LabEventProcessor>,
    connection: Arc<Mutex<Connection>>,
    queue: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HostServer {
    pub fn new(
        session_id: impl Into<String>,
        channel: Arc<dyn Channel>,
        events: Arc<dyn LabEventProcessor>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            processor: Arc::new(MessageProcessor::new(
                session_id,
                channel,
                Arc::new(QueueHandler { tx }),
            )),
            events,
            connection: Arc::new(Mutex::new(Connection::default())),
            queue: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
        }
    }

    /// Start serving. A server runs at most once.
    pub fn start(&self) -> LabResult<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Err(LabError::AlreadyStarted);
        }
        let rx = lock(&self.queue).take().ok_or(LabError::AlreadyStarted)?;

        self.processor.start()?;
        let task = Worker {
            processor: Arc::clone(&self.processor),
            events: Arc::clone(&self.events),
            connection: Arc::clone(&self.connection),
        };
        *worker = Some(tokio::spawn(task.run(rx)));

        tracing::info!(local = %self.processor.local(), "Host server started");
        Ok(())
    }

    pub fn stop(&self) -> LabResult<()> {
        let worker = lock(&self.worker).take().ok_or(LabError::NotStarted)?;
        worker.abort();
        lock(&self.connection).origin = None;
        self.processor.stop()?;
        tracing::info!(local = %self.processor.local(), "Host server stopped");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.connection).origin.is_some()
    }

    pub fn connected_origin(&self) -> Option<ContextId> {
        lock(&self.connection).origin.clone()
    }

    /// Mark the lab active or inactive; a connected lab hears about it
    pub fn set_active(&self, active: bool) {
        let origin = {
            let mut connection = lock(&self.connection);
            connection.active = active;
            connection.origin.clone()
        };
        if let Some(origin) = origin {
            push_events(&self.processor, &origin, vec![activation_event(active)]);
        }
    }

    /// Switch the lab between edit and view; a connected lab hears about it
    pub fn set_mode(&self, mode: LabMode) {
        let origin = {
            let mut connection = lock(&self.connection);
            connection.mode = Some(mode);
            connection.origin.clone()
        };
        if let Some(origin) = origin {
            push_events(&self.processor, &origin, vec![mode_event(mode)]);
        }
    }

    /// Push an arbitrary event to the connected lab and wait for it to be
    /// acknowledged
    pub async fn send_event(&self, event: Command) -> LabResult<Value> {
        let origin = self.connected_origin().ok_or(LabError::NotConnected)?;
        self.processor
            .request(&origin, serde_json::to_value(&event)?)
            .await
    }
}
