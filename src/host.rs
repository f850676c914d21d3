//! Lab host abstraction
//!
//! A [`LabHost`] is the lab's view of wherever the ledger lives: in the same
//! process ([`InMemoryLabHost`]) or across a channel
//! ([`crate::transport::ChannelLabHost`]).

mod memory;
#[cfg(test)]
pub mod testing;

pub use memory::{HostMessage, InMemoryLabHost};

use crate::error::{LabError, LabResult};
use crate::model::{Action, ActionQuery, ActionRequest, Configuration, ConfigurationInstance};
use crate::protocol::{ConnectionResponse, HostVersionInfo};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Runs once the connect handshake settles, before any event that arrived
/// during the handshake is delivered.
pub type ConnectHook<'a> = Box<dyn FnOnce(Result<&ConnectionResponse, &LabError>) + Send + 'a>;

/// Receives host-pushed events by name
pub type HostEventHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[async_trait]
pub trait LabHost: Send + Sync {
    /// Protocol versions this host can speak
    fn supported_versions(&self) -> Vec<HostVersionInfo>;

    /// Perform the connect handshake. `on_connected` sees the outcome first;
    /// events received while connecting are delivered after it returns.
    async fn connect(
        &self,
        versions: &[HostVersionInfo],
        on_connected: ConnectHook<'_>,
    ) -> LabResult<ConnectionResponse>;

    async fn disconnect(&self) -> LabResult<()>;

    /// Register a handler for host-pushed events
    fn on(&self, handler: HostEventHandler);

    async fn send_message(&self, message_type: &str, options: Value) -> LabResult<Value>;

    async fn create(&self, options: Value) -> LabResult<()>;

    async fn get_configuration(&self) -> LabResult<Option<Configuration>>;

    async fn set_configuration(&self, configuration: Configuration) -> LabResult<()>;

    async fn get_configuration_instance(&self) -> LabResult<Option<ConfigurationInstance>>;

    async fn get_state(&self) -> LabResult<Option<Value>>;

    async fn set_state(&self, state: Value) -> LabResult<()>;

    /// Take an action; the ledger computes the result
    async fn take_action(&self, request: ActionRequest) -> LabResult<Action>;

    /// Record an action whose result the caller already computed
    async fn take_completed_action(&self, request: ActionRequest, result: Value)
        -> LabResult<Action>;

    async fn get_actions(&self, query: &ActionQuery) -> LabResult<Vec<Action>>;
}

// ============================================================================
// Arc implementation for trait objects
// ============================================================================

#[async_trait]
impl<T: LabHost + ?Sized> LabHost for Arc<T> {
    fn supported_versions(&self) -> Vec<HostVersionInfo> {
        (**self).supported_versions()
    }

    async fn connect(
        &self,
        versions: &[HostVersionInfo],
        on_connected: ConnectHook<'_>,
    ) -> LabResult<ConnectionResponse> {
        (**self).connect(versions, on_connected).await
    }

    async fn disconnect(&self) -> LabResult<()> {
        (**self).disconnect().await
    }

    fn on(&self, handler: HostEventHandler) {
        (**self).on(handler);
    }

    async fn send_message(&self, message_type: &str, options: Value) -> LabResult<Value> {
        (**self).send_message(message_type, options).await
    }

    async fn create(&self, options: Value) -> LabResult<()> {
        (**self).create(options).await
    }

    async fn get_configuration(&self) -> LabResult<Option<Configuration>> {
        (**self).get_configuration().await
    }

    async fn set_configuration(&self, configuration: Configuration) -> LabResult<()> {
        (**self).set_configuration(configuration).await
    }

    async fn get_configuration_instance(&self) -> LabResult<Option<ConfigurationInstance>> {
        (**self).get_configuration_instance().await
    }

    async fn get_state(&self) -> LabResult<Option<Value>> {
        (**self).get_state().await
    }

    async fn set_state(&self, state: Value) -> LabResult<()> {
        (**self).set_state(state).await
    }

    async fn take_action(&self, request: ActionRequest) -> LabResult<Action> {
        (**self).take_action(request).await
    }

    async fn take_completed_action(
        &self,
        request: ActionRequest,
        result: Value,
    ) -> LabResult<Action> {
        (**self).take_completed_action(request, result).await
    }

    async fn get_actions(&self, query: &ActionQuery) -> LabResult<Vec<Action>> {
        (**self).get_actions(query).await
    }
}
