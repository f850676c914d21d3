//! Wire protocol shared by the lab and its host
//!
//! Every message on the channel is an [`Envelope`]. Requests carry a
//! [`Command`] payload; replies carry either the command's result
//! (`Completion`) or a failure payload (`Failure`).

use crate::model::{ActionType, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version spoken by this crate
pub const PROTOCOL_VERSION: Version = Version::new(0, 1);

/// Host versions a lab session accepts: major 0, minor up to 1
pub fn is_supported_host_version(version: Version) -> bool {
    version.major == 0 && version.minor <= 1
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Message,
    Completion,
    Failure,
}

/// A single message on the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Per-sender, monotonically increasing; replies echo the request id
    pub id: u64,
    pub session_id: String,
    pub kind: MessageKind,
    #[serde(default)]
    pub payload: Value,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Connect,
    Disconnect,
    Create,
    GetConfiguration,
    SetConfiguration,
    GetConfigurationInstance,
    TakeAction,
    GetCompletedActions,
    GetState,
    SetState,
    SendMessage,
    ModeChanged,
}

impl CommandType {
    pub const ALL: [CommandType; 12] = [
        Self::Connect,
        Self::Disconnect,
        Self::Create,
        Self::GetConfiguration,
        Self::SetConfiguration,
        Self::GetConfigurationInstance,
        Self::TakeAction,
        Self::GetCompletedActions,
        Self::GetState,
        Self::SetState,
        Self::SendMessage,
        Self::ModeChanged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Create => "create",
            Self::GetConfiguration => "getConfiguration",
            Self::SetConfiguration => "setConfiguration",
            Self::GetConfigurationInstance => "getConfigurationInstance",
            Self::TakeAction => "takeAction",
            Self::GetCompletedActions => "getCompletedActions",
            Self::GetState => "getState",
            Self::SetState => "setState",
            Self::SendMessage => "sendMessage",
            Self::ModeChanged => "modeChanged",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == tag)
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload. The type stays a plain string on the wire: hosts push
/// events through the same shape, and unknown commands must still parse so
/// they can be refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(rename = "commandData", default)]
    pub command_data: Value,
}

impl Command {
    pub fn new(command_type: CommandType, command_data: Value) -> Self {
        Self {
            command_type: command_type.as_str().to_string(),
            command_data,
        }
    }

    /// A host-pushed event such as `activate`
    pub fn event(name: &str, data: Value) -> Self {
        Self {
            command_type: name.to_string(),
            command_data: data,
        }
    }

    pub fn kind(&self) -> Option<CommandType> {
        CommandType::parse(&self.command_type)
    }
}

/// Events a host pushes to a connected lab
pub mod event_types {
    pub const MODE_CHANGED: &str = "modeChanged";
    pub const ACTIVATE: &str = "activate";
    pub const DEACTIVATE: &str = "deactivate";
}

// ============================================================================
// Command data
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVersionInfo {
    pub version: Version,
}

impl HostVersionInfo {
    pub fn current() -> Self {
        Self {
            version: PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LabMode {
    Edit,
    #[default]
    View,
}

pub mod permissions {
    pub const EDIT: &str = "Labs.Permissions.Edit";
    pub const TAKE: &str = "Labs.Permissions.Take";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl UserInfo {
    pub fn can(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationInfo {
    pub host_version: Version,
}

/// Reply to a Connect command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    #[serde(default)]
    pub initialization_info: Option<InitializationInfo>,
    pub host_version: Version,
    pub user_info: UserInfo,
    pub application_id: String,
    pub mode: LabMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeActionCommandData {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub options: Value,
    /// Null asks the ledger to compute the result
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageCommandData {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChangedData {
    pub mode: LabMode,
}
