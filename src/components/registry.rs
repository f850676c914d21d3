//! Instance tag to constructor table

use super::{ActivityComponent, ChoiceComponent, ComponentHandle, DynamicComponent, InputComponent};
use crate::error::{LabError, LabResult};
use crate::host::LabHost;
use crate::model::{ComponentInstance, ComponentKind};
use std::collections::HashMap;
use std::sync::Arc;

pub type Constructor = Arc<
    dyn Fn(ComponentInstance, Arc<dyn LabHost>, Arc<ComponentRegistry>) -> ComponentHandle
        + Send
        + Sync,
>;

/// Maps the `type` tag of a component instance to the code that wraps it.
/// Built once, validated, then shared read-only.
#[derive(Default)]
pub struct ComponentRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the four built-in component kinds
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for kind in ComponentKind::ALL {
            let constructor: Constructor = match kind {
                ComponentKind::Choice => Arc::new(|instance, host, _| {
                    ComponentHandle::Choice(ChoiceComponent::new(instance, host))
                }),
                ComponentKind::Input => Arc::new(|instance, host, _| {
                    ComponentHandle::Input(InputComponent::new(instance, host))
                }),
                ComponentKind::Activity => Arc::new(|instance, host, _| {
                    ComponentHandle::Activity(ActivityComponent::new(instance, host))
                }),
                ComponentKind::Dynamic => Arc::new(|instance, host, registry| {
                    ComponentHandle::Dynamic(DynamicComponent::new(instance, host, registry))
                }),
            };
            // Tags are distinct, so this cannot collide
            registry
                .constructors
                .insert(kind.instance_type().to_string(), constructor);
        }
        registry
    }

    pub fn register(&mut self, tag: impl Into<String>, constructor: Constructor) -> LabResult<()> {
        let tag = tag.into();
        if self.constructors.contains_key(&tag) {
            return Err(LabError::DuplicateComponentType(tag));
        }
        tracing::debug!(tag = %tag, "Registered component constructor");
        self.constructors.insert(tag, constructor);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Fail unless every known component kind can be built
    pub fn validate(&self) -> LabResult<()> {
        for kind in ComponentKind::ALL {
            if !self.contains(kind.instance_type()) {
                return Err(LabError::UnknownComponentType(kind.instance_type().to_string()));
            }
        }
        Ok(())
    }

    pub fn build(
        self: &Arc<Self>,
        instance: ComponentInstance,
        host: Arc<dyn LabHost>,
    ) -> LabResult<ComponentHandle> {
        let constructor = self
            .constructors
            .get(&instance.instance_type)
            .ok_or_else(|| LabError::UnknownComponentType(instance.instance_type.clone()))?;
        Ok(constructor(instance, host, Arc::clone(self)))
    }
}
