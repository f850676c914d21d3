//! Authored configuration and its per-user instance projection

use super::ValueMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Semantic version carried by configurations and hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

// ============================================================================
// Component kinds
// ============================================================================

pub const CHOICE_COMPONENT_TYPE: &str = "Labs.Components.ChoiceComponent";
pub const INPUT_COMPONENT_TYPE: &str = "Labs.Components.InputComponent";
pub const ACTIVITY_COMPONENT_TYPE: &str = "Labs.Components.ActivityComponent";
pub const DYNAMIC_COMPONENT_TYPE: &str = "Labs.Components.DynamicComponent";

pub const CHOICE_COMPONENT_INSTANCE_TYPE: &str = "Labs.Components.ChoiceComponentInstance";
pub const INPUT_COMPONENT_INSTANCE_TYPE: &str = "Labs.Components.InputComponentInstance";
pub const ACTIVITY_COMPONENT_INSTANCE_TYPE: &str = "Labs.Components.ActivityComponentInstance";
pub const DYNAMIC_COMPONENT_INSTANCE_TYPE: &str = "Labs.Components.DynamicComponentInstance";

/// The closed set of component kinds the engine knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Choice,
    Input,
    Activity,
    Dynamic,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Choice,
        ComponentKind::Input,
        ComponentKind::Activity,
        ComponentKind::Dynamic,
    ];

    /// Tag used in authored configurations
    pub fn component_type(self) -> &'static str {
        match self {
            Self::Choice => CHOICE_COMPONENT_TYPE,
            Self::Input => INPUT_COMPONENT_TYPE,
            Self::Activity => ACTIVITY_COMPONENT_TYPE,
            Self::Dynamic => DYNAMIC_COMPONENT_TYPE,
        }
    }

    /// Tag used in configuration instances
    pub fn instance_type(self) -> &'static str {
        match self {
            Self::Choice => CHOICE_COMPONENT_INSTANCE_TYPE,
            Self::Input => INPUT_COMPONENT_INSTANCE_TYPE,
            Self::Activity => ACTIVITY_COMPONENT_INSTANCE_TYPE,
            Self::Dynamic => DYNAMIC_COMPONENT_INSTANCE_TYPE,
        }
    }

    pub fn from_component_type(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.component_type() == tag)
    }

    pub fn from_instance_type(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.instance_type() == tag)
    }
}

// ============================================================================
// Authored configuration
// ============================================================================

/// A value declared by the author (hint, answer, or other secured data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueDefinition {
    #[serde(default)]
    pub is_hint: bool,
    #[serde(default)]
    pub value: Value,
}

impl ValueDefinition {
    pub fn hint(value: impl Into<Value>) -> Self {
        Self {
            is_hint: true,
            value: value.into(),
        }
    }

    pub fn plain(value: impl Into<Value>) -> Self {
        Self {
            is_hint: false,
            value: value.into(),
        }
    }
}

/// An authored component definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub values: ValueMap<ValueDefinition>,
    /// Secure components never ship value payloads or answers to the user
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secure: bool,
    /// Type-specific fields (choices, question, limits, answer...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Component {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            component_type: kind.component_type().to_string(),
            name: None,
            values: ValueMap::new(),
            secure: false,
            fields: Map::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_values(mut self, key: impl Into<String>, values: Vec<ValueDefinition>) -> Self {
        self.values.insert(key, values);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn secured(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn kind(&self) -> Option<ComponentKind> {
        ComponentKind::from_component_type(&self.component_type)
    }
}

/// The authored lab document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub app_version: Version,
    #[serde(default)]
    pub components: Vec<Component>,
    pub name: String,
    #[serde(default)]
    pub timeline: Option<Value>,
    #[serde(default)]
    pub analytics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Configuration {
    pub fn new(name: impl Into<String>, app_version: Version) -> Self {
        Self {
            app_version,
            components: Vec::new(),
            name: name.into(),
            timeline: None,
            analytics: None,
            data: None,
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }
}

// ============================================================================
// Instance projection
// ============================================================================

/// A value as seen by the user: identified, and stripped when secured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueInstance {
    pub value_id: String,
    pub is_hint: bool,
    pub has_value: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A component as seen by the user, carrying its ledger-assigned identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInstance {
    pub component_id: String,
    #[serde(rename = "type")]
    pub instance_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub values: ValueMap<ValueInstance>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ComponentInstance {
    pub fn kind(&self) -> Option<ComponentKind> {
        ComponentKind::from_instance_type(&self.instance_type)
    }
}

/// Per-user projection of a [`Configuration`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationInstance {
    pub app_version: Version,
    pub components: Vec<ComponentInstance>,
    pub name: String,
    #[serde(default)]
    pub timeline: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
