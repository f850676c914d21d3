//! Database schema and record types

use crate::model::{Configuration, ConfigurationInstance};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS ledger_snapshot (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    created BOOLEAN NOT NULL DEFAULT 0,
    configuration TEXT,
    instance TEXT,
    state TEXT,
    next_id INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS actions (
    sequence_id INTEGER PRIMARY KEY AUTOINCREMENT,
    action_type TEXT NOT NULL,
    options TEXT NOT NULL,
    result TEXT NOT NULL,
    time INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_actions_type ON actions(action_type, sequence_id);
";

/// Everything about a ledger except its action log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub created: bool,
    pub configuration: Option<Configuration>,
    pub instance: Option<ConfigurationInstance>,
    pub state: Option<Value>,
    /// Next identifier to hand out; never rewinds
    pub next_id: u64,
}
