//! Lab-side host that talks to a [`super::HostServer`] over a channel

use super::gate::{EventGate, GateState};
use super::processor::{MessageHandler, MessageProcessor, Responder};
use crate::channel::{Channel, ContextId};
use crate::error::{LabError, LabResult};
use crate::host::{ConnectHook, HostEventHandler, LabHost};
use crate::model::{Action, ActionQuery, ActionRequest, Configuration, ConfigurationInstance};
use crate::protocol::{
    Command, CommandType, ConnectionResponse, HostVersionInfo, SendMessageCommandData,
    TakeActionCommandData,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Inbound requests from anyone but the connected host are ignored
struct GateHandler {
    gate: Arc<EventGate>,
    target: ContextId,
}

impl MessageHandler for GateHandler {
    fn on_message(&self, origin: ContextId, payload: Value, responder: Responder) {
        if origin != self.target {
            tracing::warn!(origin = %origin, "Ignoring event from unexpected origin");
            drop(responder);
            return;
        }
        match serde_json::from_value::<Command>(payload) {
            Ok(command) => self.gate.accept(command, responder),
            Err(e) => responder.respond_with(Err(LabError::invalid_payload(e.to_string()))),
        }
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> LabResult<T> {
    serde_json::from_value(payload).map_err(|e| LabError::invalid_payload(e.to_string()))
}

pub struct ChannelLabHost {
    processor: MessageProcessor,
    gate: Arc<EventGate>,
    target: ContextId,
    version: HostVersionInfo,
}

impl ChannelLabHost {
    /// A host reached through `channel` at `target`. `session_id` scopes the
    /// conversation; both ends must agree on it.
    pub fn new(channel: Arc<dyn Channel>, session_id: impl Into<String>, target: ContextId) -> Self {
        let gate = Arc::new(EventGate::new());
        let handler = Arc::new(GateHandler {
            gate: Arc::clone(&gate),
            target: target.clone(),
        });
        Self {
            processor: MessageProcessor::new(session_id, channel, handler),
            gate,
            target,
            version: HostVersionInfo::current(),
        }
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    async fn send_command(&self, command_type: CommandType, data: Value) -> LabResult<Value> {
        let command = Command::new(command_type, data);
        tracing::debug!(command = %command_type, peer = %self.target, "Sending command");
        self.processor
            .request(&self.target, serde_json::to_value(&command)?)
            .await
    }

    async fn handshake(&self) -> LabResult<ConnectionResponse> {
        let payload = self
            .send_command(CommandType::Connect, serde_json::to_value(self.version)?)
            .await?;
        let response: ConnectionResponse = decode(payload)?;

        let expected = self.version.version.major;
        let actual = response.host_version.major;
        if actual != expected {
            return Err(LabError::VersionMismatch { expected, actual });
        }
        Ok(response)
    }

    async fn take(&self, request: &ActionRequest, result: Value) -> LabResult<Action> {
        let data = TakeActionCommandData {
            action_type: request.action_type(),
            options: request.options_value()?,
            result,
        };
        let payload = self
            .send_command(CommandType::TakeAction, serde_json::to_value(&data)?)
            .await?;
        decode(payload)
    }
}

#[async_trait]
impl LabHost for ChannelLabHost {
    fn supported_versions(&self) -> Vec<HostVersionInfo> {
        vec![self.version]
    }

    async fn connect(
        &self,
        _versions: &[HostVersionInfo],
        on_connected: ConnectHook<'_>,
    ) -> LabResult<ConnectionResponse> {
        // A failed connect leaves the processor listening for a retry
        if !self.processor.is_started() {
            self.processor.start()?;
        }
        self.gate.begin_collecting();

        let outcome = self.handshake().await;
        on_connected(outcome.as_ref());
        self.gate.settle(outcome.as_ref().map(|_| ()));

        match &outcome {
            Ok(response) => {
                tracing::info!(
                    peer = %self.target,
                    application_id = %response.application_id,
                    "Connected to host"
                );
            }
            Err(e) => {
                tracing::error!(peer = %self.target, error = %e, "Connect failed");
            }
        }
        outcome
    }

    async fn disconnect(&self) -> LabResult<()> {
        self.gate.reject();
        let outcome = self.send_command(CommandType::Disconnect, Value::Null).await;
        self.processor.stop()?;
        tracing::info!(peer = %self.target, "Disconnected from host");
        outcome.map(drop)
    }

    fn on(&self, handler: HostEventHandler) {
        self.gate.on(handler);
    }

    async fn send_message(&self, message_type: &str, options: Value) -> LabResult<Value> {
        let data = SendMessageCommandData {
            message_type: message_type.to_string(),
            options,
        };
        self.send_command(CommandType::SendMessage, serde_json::to_value(&data)?)
            .await
    }

    async fn create(&self, options: Value) -> LabResult<()> {
        self.send_command(CommandType::Create, options).await.map(drop)
    }

    async fn get_configuration(&self) -> LabResult<Option<Configuration>> {
        decode(self.send_command(CommandType::GetConfiguration, Value::Null).await?)
    }

    async fn set_configuration(&self, configuration: Configuration) -> LabResult<()> {
        self.send_command(CommandType::SetConfiguration, serde_json::to_value(&configuration)?)
            .await
            .map(drop)
    }

    async fn get_configuration_instance(&self) -> LabResult<Option<ConfigurationInstance>> {
        decode(
            self.send_command(CommandType::GetConfigurationInstance, Value::Null)
                .await?,
        )
    }

    async fn get_state(&self) -> LabResult<Option<Value>> {
        let state = self.send_command(CommandType::GetState, Value::Null).await?;
        Ok((!state.is_null()).then_some(state))
    }

    async fn set_state(&self, state: Value) -> LabResult<()> {
        self.send_command(CommandType::SetState, state).await.map(drop)
    }

    async fn take_action(&self, request: ActionRequest) -> LabResult<Action> {
        self.take(&request, Value::Null).await
    }

    async fn take_completed_action(
        &self,
        request: ActionRequest,
        result: Value,
    ) -> LabResult<Action> {
        if result.is_null() {
            return Err(LabError::invalid_payload(
                "a completed action needs a result",
            ));
        }
        self.take(&request, result).await
    }

    async fn get_actions(&self, query: &ActionQuery) -> LabResult<Vec<Action>> {
        decode(
            self.send_command(CommandType::GetCompletedActions, serde_json::to_value(query)?)
                .await?,
        )
    }
}
