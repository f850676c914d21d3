//! Containers that grow at runtime
//!
//! Children and closure are both read back from the ledger on every call, so
//! a container reopened after a restart sees exactly what was recorded.

use super::{ComponentHandle, ComponentRegistry};
use crate::error::{LabError, LabResult};
use crate::host::LabHost;
use crate::model::{
    Action, ActionQuery, ActionRequest, ActionType, CloseComponentOptions, Component,
    ComponentInstance, CreateComponentOptions, CreateComponentResult,
};
use std::sync::Arc;

pub struct DynamicComponent {
    instance: ComponentInstance,
    host: Arc<dyn LabHost>,
    registry: Arc<ComponentRegistry>,
}

impl DynamicComponent {
    pub fn new(
        instance: ComponentInstance,
        host: Arc<dyn LabHost>,
        registry: Arc<ComponentRegistry>,
    ) -> Self {
        Self {
            instance,
            host,
            registry,
        }
    }

    pub fn id(&self) -> &str {
        &self.instance.component_id
    }

    pub fn instance(&self) -> &ComponentInstance {
        &self.instance
    }

    /// Children created so far, in creation order
    pub async fn get_components(&self) -> LabResult<Vec<ComponentHandle>> {
        let actions = self
            .host
            .get_actions(&ActionQuery::component_actions(
                self.id(),
                ActionType::CreateComponent,
            ))
            .await?;
        actions.iter().map(|action| self.build_child(action)).collect()
    }

    pub async fn create_component(&self, component: Component) -> LabResult<ComponentHandle> {
        if self.is_closed().await? {
            return Err(LabError::ComponentClosed(self.id().to_string()));
        }

        let action = self
            .host
            .take_action(ActionRequest::CreateComponent(CreateComponentOptions {
                component_id: self.id().to_string(),
                component,
                correlation_id: None,
            }))
            .await?;
        let child = self.build_child(&action)?;
        tracing::info!(
            component_id = %self.id(),
            child_id = %child.component_id(),
            "Component created"
        );
        Ok(child)
    }

    /// Stop accepting new children. Closing twice records nothing new.
    pub async fn close(&self) -> LabResult<()> {
        if self.is_closed().await? {
            return Ok(());
        }
        self.host
            .take_action(ActionRequest::CloseComponent(CloseComponentOptions {
                component_id: self.id().to_string(),
            }))
            .await?;
        tracing::info!(component_id = %self.id(), "Component closed");
        Ok(())
    }

    pub async fn is_closed(&self) -> LabResult<bool> {
        let closes = self
            .host
            .get_actions(&ActionQuery::component_actions(
                self.id(),
                ActionType::CloseComponent,
            ))
            .await?;
        Ok(!closes.is_empty())
    }

    fn build_child(&self, action: &Action) -> LabResult<ComponentHandle> {
        let result: CreateComponentResult = action.decode_result()?;
        self.registry
            .build(result.component_instance, Arc::clone(&self.host))
    }
}
