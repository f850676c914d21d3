//! Actions: the immutable records the ledger appends

use super::{Component, ComponentInstance};
use crate::error::{LabError, LabResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The closed set of action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "Labs.Core.Actions.CreateAttemptAction")]
    CreateAttempt,
    #[serde(rename = "Labs.Core.Actions.ResumeAttemptAction")]
    ResumeAttempt,
    #[serde(rename = "Labs.Core.Actions.GetValueAction")]
    GetValue,
    #[serde(rename = "Labs.Core.Actions.SubmitAnswerAction")]
    SubmitAnswer,
    #[serde(rename = "Labs.Core.Actions.AttemptTimeoutAction")]
    AttemptTimeout,
    #[serde(rename = "Labs.Core.Actions.CreateComponentAction")]
    CreateComponent,
    #[serde(rename = "Labs.Core.Actions.CloseComponentAction")]
    CloseComponent,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateAttempt => "Labs.Core.Actions.CreateAttemptAction",
            Self::ResumeAttempt => "Labs.Core.Actions.ResumeAttemptAction",
            Self::GetValue => "Labs.Core.Actions.GetValueAction",
            Self::SubmitAnswer => "Labs.Core.Actions.SubmitAnswerAction",
            Self::AttemptTimeout => "Labs.Core.Actions.AttemptTimeoutAction",
            Self::CreateComponent => "Labs.Core.Actions.CreateComponentAction",
            Self::CloseComponent => "Labs.Core.Actions.CloseComponentAction",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed action. Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub options: Value,
    #[serde(default)]
    pub result: Value,
    /// Milliseconds since the Unix epoch
    pub time: i64,
}

impl Action {
    /// Component the action is attributed to
    pub fn component_id(&self) -> Option<&str> {
        self.options.get("componentId").and_then(Value::as_str)
    }

    /// Attempt the action is attributed to, if any
    pub fn attempt_id(&self) -> Option<&str> {
        self.options.get("attemptId").and_then(Value::as_str)
    }

    pub fn decode_options<T: DeserializeOwned>(&self) -> LabResult<T> {
        serde_json::from_value(self.options.clone()).map_err(|e| {
            LabError::invalid_payload(format!("{} options: {e}", self.action_type))
        })
    }

    pub fn decode_result<T: DeserializeOwned>(&self) -> LabResult<T> {
        serde_json::from_value(self.result.clone()).map_err(|e| {
            LabError::invalid_payload(format!("{} result: {e}", self.action_type))
        })
    }
}

// ============================================================================
// Typed options and results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttemptOptions {
    pub component_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttemptResult {
    pub attempt_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeAttemptOptions {
    pub component_id: String,
    pub attempt_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetValueOptions {
    pub component_id: String,
    pub attempt_id: String,
    pub value_id: String,
    #[serde(default)]
    pub is_hint: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetValueResult {
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerOptions {
    pub component_id: String,
    pub attempt_id: String,
    #[serde(default)]
    pub answer: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerResult {
    #[serde(default)]
    pub submission_id: Option<String>,
    pub complete: bool,
    #[serde(default)]
    pub score: Option<f64>,
}

impl SubmitAnswerResult {
    /// A result graded by the lab itself, before the ledger assigns an id
    pub fn graded(score: Option<f64>, complete: bool) -> Self {
        Self {
            submission_id: None,
            complete,
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptTimeoutOptions {
    pub component_id: String,
    pub attempt_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComponentOptions {
    pub component_id: String,
    pub component: Component,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComponentResult {
    pub component_instance: ComponentInstance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseComponentOptions {
    pub component_id: String,
}

/// An action about to be taken: its type and typed options
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    CreateAttempt(CreateAttemptOptions),
    ResumeAttempt(ResumeAttemptOptions),
    GetValue(GetValueOptions),
    SubmitAnswer(SubmitAnswerOptions),
    AttemptTimeout(AttemptTimeoutOptions),
    CreateComponent(CreateComponentOptions),
    CloseComponent(CloseComponentOptions),
}

impl ActionRequest {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::CreateAttempt(_) => ActionType::CreateAttempt,
            Self::ResumeAttempt(_) => ActionType::ResumeAttempt,
            Self::GetValue(_) => ActionType::GetValue,
            Self::SubmitAnswer(_) => ActionType::SubmitAnswer,
            Self::AttemptTimeout(_) => ActionType::AttemptTimeout,
            Self::CreateComponent(_) => ActionType::CreateComponent,
            Self::CloseComponent(_) => ActionType::CloseComponent,
        }
    }

    pub fn component_id(&self) -> &str {
        match self {
            Self::CreateAttempt(o) => &o.component_id,
            Self::ResumeAttempt(o) => &o.component_id,
            Self::GetValue(o) => &o.component_id,
            Self::SubmitAnswer(o) => &o.component_id,
            Self::AttemptTimeout(o) => &o.component_id,
            Self::CreateComponent(o) => &o.component_id,
            Self::CloseComponent(o) => &o.component_id,
        }
    }

    pub fn options_value(&self) -> LabResult<Value> {
        let value = match self {
            Self::CreateAttempt(o) => serde_json::to_value(o),
            Self::ResumeAttempt(o) => serde_json::to_value(o),
            Self::GetValue(o) => serde_json::to_value(o),
            Self::SubmitAnswer(o) => serde_json::to_value(o),
            Self::AttemptTimeout(o) => serde_json::to_value(o),
            Self::CreateComponent(o) => serde_json::to_value(o),
            Self::CloseComponent(o) => serde_json::to_value(o),
        }?;
        Ok(value)
    }

    /// Rebuild a request from its wire form
    pub fn from_parts(action_type: ActionType, options: Value) -> LabResult<Self> {
        fn decode<T: DeserializeOwned>(action_type: ActionType, options: Value) -> LabResult<T> {
            serde_json::from_value(options)
                .map_err(|e| LabError::invalid_payload(format!("{action_type} options: {e}")))
        }

        Ok(match action_type {
            ActionType::CreateAttempt => Self::CreateAttempt(decode(action_type, options)?),
            ActionType::ResumeAttempt => Self::ResumeAttempt(decode(action_type, options)?),
            ActionType::GetValue => Self::GetValue(decode(action_type, options)?),
            ActionType::SubmitAnswer => Self::SubmitAnswer(decode(action_type, options)?),
            ActionType::AttemptTimeout => Self::AttemptTimeout(decode(action_type, options)?),
            ActionType::CreateComponent => Self::CreateComponent(decode(action_type, options)?),
            ActionType::CloseComponent => Self::CloseComponent(decode(action_type, options)?),
        })
    }
}

// ============================================================================
// Queries
// ============================================================================

pub const GET_ATTEMPT_QUERY: &str = "Labs.Core.GetActions.GetAttempt";
pub const GET_COMPONENT_ACTIONS_QUERY: &str = "Labs.Core.GetActions.GetComponentActions";

/// The two supported ways of reading the action log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options")]
pub enum ActionQuery {
    /// Every action for one attempt
    #[serde(rename = "Labs.Core.GetActions.GetAttempt")]
    Attempt {
        #[serde(rename = "attemptId")]
        attempt_id: String,
    },
    /// Every action of one type for one component
    #[serde(rename = "Labs.Core.GetActions.GetComponentActions")]
    ComponentActions {
        #[serde(rename = "componentId")]
        component_id: String,
        action: ActionType,
    },
}

impl ActionQuery {
    pub fn attempt(attempt_id: impl Into<String>) -> Self {
        Self::Attempt {
            attempt_id: attempt_id.into(),
        }
    }

    pub fn component_actions(component_id: impl Into<String>, action: ActionType) -> Self {
        Self::ComponentActions {
            component_id: component_id.into(),
            action,
        }
    }

    pub fn matches(&self, action: &Action) -> bool {
        match self {
            Self::Attempt { attempt_id } => action.attempt_id() == Some(attempt_id.as_str()),
            Self::ComponentActions {
                component_id,
                action: action_type,
            } => {
                action.action_type == *action_type
                    && action.component_id() == Some(component_id.as_str())
            }
        }
    }
}
