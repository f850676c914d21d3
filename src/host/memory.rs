//! In-process lab host backed directly by a [`Ledger`]

use super::{ConnectHook, HostEventHandler, LabHost};
use crate::error::LabResult;
use crate::ledger::Ledger;
use crate::lock;
use crate::model::{
    Action, ActionQuery, ActionRequest, Configuration, ConfigurationInstance, Version,
};
use crate::protocol::{
    permissions, ConnectionResponse, HostVersionInfo, InitializationInfo, LabMode, UserInfo,
    PROTOCOL_VERSION,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// A message the lab sent to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostMessage {
    pub message_type: String,
    pub options: Value,
}

pub struct InMemoryLabHost {
    version: Version,
    ledger: Arc<Mutex<Ledger>>,
    user: UserInfo,
    application_id: String,
    mode: LabMode,
    handlers: Mutex<Vec<HostEventHandler>>,
    messages: Mutex<Vec<HostMessage>>,
}

impl InMemoryLabHost {
    /// A host advertising `version`, over a fresh ledger
    pub fn new(version: Version) -> Self {
        Self {
            version,
            ledger: Arc::new(Mutex::new(Ledger::new())),
            user: UserInfo {
                id: "local-user".to_string(),
                permissions: vec![permissions::EDIT.to_string(), permissions::TAKE.to_string()],
            },
            application_id: uuid::Uuid::new_v4().to_string(),
            mode: LabMode::Edit,
            handlers: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Serve from an existing (possibly journaled) ledger
    pub fn with_ledger(mut self, ledger: Arc<Mutex<Ledger>>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = user;
        self
    }

    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = application_id.into();
        self
    }

    pub fn with_mode(mut self, mode: LabMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ledger)
    }

    /// Messages sent by the lab, in order
    pub fn messages(&self) -> Vec<HostMessage> {
        lock(&self.messages).clone()
    }

    /// Push an event to every registered handler
    pub fn fire_event(&self, name: &str, data: &Value) {
        let handlers = lock(&self.handlers).clone();
        for handler in handlers {
            handler(name, data);
        }
    }

    fn connection_response(&self) -> ConnectionResponse {
        let created = lock(&self.ledger).is_created();
        ConnectionResponse {
            initialization_info: created.then_some(InitializationInfo {
                host_version: self.version,
            }),
            host_version: PROTOCOL_VERSION,
            user_info: self.user.clone(),
            application_id: self.application_id.clone(),
            mode: self.mode,
        }
    }
}

#[async_trait]
impl LabHost for InMemoryLabHost {
    fn supported_versions(&self) -> Vec<HostVersionInfo> {
        vec![HostVersionInfo {
            version: self.version,
        }]
    }

    async fn connect(
        &self,
        _versions: &[HostVersionInfo],
        on_connected: ConnectHook<'_>,
    ) -> LabResult<ConnectionResponse> {
        let response = self.connection_response();
        on_connected(Ok(&response));
        tracing::info!(application_id = %response.application_id, "In-memory host connected");
        Ok(response)
    }

    async fn disconnect(&self) -> LabResult<()> {
        tracing::info!("In-memory host disconnected");
        Ok(())
    }

    fn on(&self, handler: HostEventHandler) {
        lock(&self.handlers).push(handler);
    }

    async fn send_message(&self, message_type: &str, options: Value) -> LabResult<Value> {
        lock(&self.messages).push(HostMessage {
            message_type: message_type.to_string(),
            options,
        });
        Ok(Value::Null)
    }

    async fn create(&self, _options: Value) -> LabResult<()> {
        lock(&self.ledger).create()
    }

    async fn get_configuration(&self) -> LabResult<Option<Configuration>> {
        Ok(lock(&self.ledger).configuration().cloned())
    }

    async fn set_configuration(&self, configuration: Configuration) -> LabResult<()> {
        lock(&self.ledger).set_configuration(configuration)
    }

    async fn get_configuration_instance(&self) -> LabResult<Option<ConfigurationInstance>> {
        lock(&self.ledger).configuration_instance()
    }

    async fn get_state(&self) -> LabResult<Option<Value>> {
        Ok(lock(&self.ledger).state().cloned())
    }

    async fn set_state(&self, state: Value) -> LabResult<()> {
        lock(&self.ledger).set_state(state)
    }

    async fn take_action(&self, request: ActionRequest) -> LabResult<Action> {
        lock(&self.ledger).take_action(&request)
    }

    async fn take_completed_action(
        &self,
        request: ActionRequest,
        result: Value,
    ) -> LabResult<Action> {
        lock(&self.ledger).take_completed_action(&request, result)
    }

    async fn get_actions(&self, query: &ActionQuery) -> LabResult<Vec<Action>> {
        Ok(lock(&self.ledger).get_actions(query))
    }
}
