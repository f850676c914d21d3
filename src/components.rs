//! Component wrappers built from a configuration instance
//!
//! Each instance carries a `type` tag; the [`ComponentRegistry`] turns it
//! into a [`ComponentHandle`], a closed set of the supported kinds.

mod dynamic;
mod gradable;
mod registry;

pub use dynamic::DynamicComponent;
pub use gradable::{ActivityComponent, ChoiceComponent, GradableComponent, InputComponent};
pub use registry::{ComponentRegistry, Constructor};

use crate::model::{ComponentInstance, ComponentKind};

pub enum ComponentHandle {
    Choice(ChoiceComponent),
    Input(InputComponent),
    Activity(ActivityComponent),
    Dynamic(DynamicComponent),
}

impl std::fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("kind", &self.kind())
            .field("instance", self.instance())
            .finish_non_exhaustive()
    }
}

impl ComponentHandle {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Choice(_) => ComponentKind::Choice,
            Self::Input(_) => ComponentKind::Input,
            Self::Activity(_) => ComponentKind::Activity,
            Self::Dynamic(_) => ComponentKind::Dynamic,
        }
    }

    pub fn instance(&self) -> &ComponentInstance {
        match self {
            Self::Choice(c) => c.instance(),
            Self::Input(c) => c.instance(),
            Self::Activity(c) => c.instance(),
            Self::Dynamic(c) => c.instance(),
        }
    }

    pub fn component_id(&self) -> &str {
        &self.instance().component_id
    }

    pub fn name(&self) -> Option<&str> {
        self.instance().name.as_deref()
    }
}
