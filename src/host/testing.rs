//! Mock hosts and fixtures for testing

use super::{ConnectHook, HostEventHandler, InMemoryLabHost, LabHost};
use crate::error::{LabError, LabResult};
use crate::model::{
    Action, ActionQuery, ActionRequest, ActionType, Component, ComponentKind, Configuration,
    ConfigurationInstance, ValueDefinition, Version,
};
use crate::protocol::{ConnectionResponse, HostVersionInfo};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

// ============================================================================
// Fixtures
// ============================================================================

/// One choice component: two choices, "0" correct, two hints
pub fn choice_configuration() -> Configuration {
    Configuration::new("Test Lab", Version::new(0, 1)).with_component(
        Component::new(ComponentKind::Choice)
            .named("Test Lab")
            .with_field("question", "Is the sky blue?")
            .with_field(
                "choices",
                json!([
                    { "id": "0", "name": "True", "value": "True" },
                    { "id": "1", "name": "False", "value": "False" }
                ]),
            )
            .with_field("answer", "0")
            .with_field("maxAttempts", 0)
            .with_values(
                "hints",
                vec![ValueDefinition::hint("First hint"), ValueDefinition::hint("Second hint")],
            ),
    )
}

/// One empty dynamic container
pub fn dynamic_configuration() -> Configuration {
    Configuration::new("Dynamic Lab", Version::new(0, 1))
        .with_component(Component::new(ComponentKind::Dynamic).named("Container"))
}

pub fn no_hook<'a>() -> ConnectHook<'a> {
    Box::new(|_: Result<&ConnectionResponse, &LabError>| {})
}

// ============================================================================
// Recording host
// ============================================================================

/// In-memory host that counts action requests and can fail the next request
/// of a given type.
pub struct RecordingHost {
    inner: InMemoryLabHost,
    counts: Mutex<HashMap<ActionType, usize>>,
    failures: Mutex<HashMap<ActionType, LabError>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::wrap(InMemoryLabHost::new(Version::new(0, 1)))
    }

    pub fn wrap(inner: InMemoryLabHost) -> Self {
        Self {
            inner,
            counts: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &InMemoryLabHost {
        &self.inner
    }

    /// Number of actions of `action_type` requested so far, failed ones included
    pub fn count(&self, action_type: ActionType) -> usize {
        self.counts.lock().unwrap().get(&action_type).copied().unwrap_or(0)
    }

    /// Fail the next request of `action_type` with `error`
    pub fn fail_next(&self, action_type: ActionType, error: LabError) {
        self.failures.lock().unwrap().insert(action_type, error);
    }

    fn record(&self, action_type: ActionType) -> LabResult<()> {
        *self.counts.lock().unwrap().entry(action_type).or_default() += 1;
        match self.failures.lock().unwrap().remove(&action_type) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LabHost for RecordingHost {
    fn supported_versions(&self) -> Vec<HostVersionInfo> {
        self.inner.supported_versions()
    }

    async fn connect(
        &self,
        versions: &[HostVersionInfo],
        on_connected: ConnectHook<'_>,
    ) -> LabResult<ConnectionResponse> {
        self.inner.connect(versions, on_connected).await
    }

    async fn disconnect(&self) -> LabResult<()> {
        self.inner.disconnect().await
    }

    fn on(&self, handler: HostEventHandler) {
        self.inner.on(handler);
    }

    async fn send_message(&self, message_type: &str, options: Value) -> LabResult<Value> {
        self.inner.send_message(message_type, options).await
    }

    async fn create(&self, options: Value) -> LabResult<()> {
        self.inner.create(options).await
    }

    async fn get_configuration(&self) -> LabResult<Option<Configuration>> {
        self.inner.get_configuration().await
    }

    async fn set_configuration(&self, configuration: Configuration) -> LabResult<()> {
        self.inner.set_configuration(configuration).await
    }

    async fn get_configuration_instance(&self) -> LabResult<Option<ConfigurationInstance>> {
        self.inner.get_configuration_instance().await
    }

    async fn get_state(&self) -> LabResult<Option<Value>> {
        self.inner.get_state().await
    }

    async fn set_state(&self, state: Value) -> LabResult<()> {
        self.inner.set_state(state).await
    }

    async fn take_action(&self, request: ActionRequest) -> LabResult<Action> {
        self.record(request.action_type())?;
        self.inner.take_action(request).await
    }

    async fn take_completed_action(
        &self,
        request: ActionRequest,
        result: Value,
    ) -> LabResult<Action> {
        self.record(request.action_type())?;
        self.inner.take_completed_action(request, result).await
    }

    async fn get_actions(&self, query: &ActionQuery) -> LabResult<Vec<Action>> {
        self.inner.get_actions(query).await
    }
}
