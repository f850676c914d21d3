//! Database module for the session ledger
//!
//! Journals the ledger snapshot and its append-only action log to SQLite so a
//! ledger can be restored in a later process.

mod schema;

pub use schema::*;

use crate::model::{Action, ActionType};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Snapshot Operations ====================

    /// Load the stored snapshot, if one was ever saved
    pub fn load_snapshot(&self) -> DbResult<Option<LedgerSnapshot>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT created, configuration, instance, state, next_id
                 FROM ledger_snapshot WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, bool>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((created, configuration, instance, state, next_id)) = row else {
            return Ok(None);
        };

        Ok(Some(LedgerSnapshot {
            created,
            configuration: configuration.as_deref().map(serde_json::from_str).transpose()?,
            instance: instance.as_deref().map(serde_json::from_str).transpose()?,
            state: state.as_deref().map(serde_json::from_str).transpose()?,
            next_id: u64::try_from(next_id)
                .map_err(|_| DbError::Corrupt(format!("negative next_id {next_id}")))?,
        }))
    }

    /// Replace the stored snapshot
    pub fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> DbResult<()> {
        write_snapshot(&self.conn(), snapshot)
    }

    /// Store a snapshot and drop the action log in one transaction
    pub fn reset_with_snapshot(&self, snapshot: &LedgerSnapshot) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM actions", [])?;
        write_snapshot(&tx, snapshot)?;
        tx.commit()?;
        Ok(())
    }

    // ==================== Action Operations ====================

    /// Append a completed action, returning its sequence id
    pub fn append_action(&self, action: &Action) -> DbResult<i64> {
        insert_action(&self.conn(), action)
    }

    /// Append a completed action and store the snapshot that follows it.
    /// Either both land or neither does.
    pub fn append_with_snapshot(&self, action: &Action, snapshot: &LedgerSnapshot) -> DbResult<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let sequence_id = insert_action(&tx, action)?;
        write_snapshot(&tx, snapshot)?;
        tx.commit()?;
        Ok(sequence_id)
    }

    /// Load the full action log in append order
    pub fn load_actions(&self) -> DbResult<Vec<Action>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT action_type, options, result, time FROM actions ORDER BY sequence_id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut actions = Vec::new();
        for row in rows {
            let (action_type, options, result, time) = row?;
            let action_type: ActionType =
                serde_json::from_value(serde_json::Value::String(action_type))?;
            actions.push(Action {
                action_type,
                options: serde_json::from_str(&options)?,
                result: serde_json::from_str(&result)?,
                time,
            });
        }
        Ok(actions)
    }

    /// Drop the whole action log
    pub fn clear_actions(&self) -> DbResult<()> {
        self.conn().execute("DELETE FROM actions", [])?;
        Ok(())
    }
}

fn write_snapshot(conn: &Connection, snapshot: &LedgerSnapshot) -> DbResult<()> {
    let configuration = snapshot
        .configuration
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let instance = snapshot.instance.as_ref().map(serde_json::to_string).transpose()?;
    let state = snapshot.state.as_ref().map(serde_json::to_string).transpose()?;
    let next_id = i64::try_from(snapshot.next_id)
        .map_err(|_| DbError::Corrupt(format!("next_id {} out of range", snapshot.next_id)))?;

    conn.execute(
        "INSERT INTO ledger_snapshot (id, created, configuration, instance, state, next_id, updated_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            created = excluded.created,
            configuration = excluded.configuration,
            instance = excluded.instance,
            state = excluded.state,
            next_id = excluded.next_id,
            updated_at = excluded.updated_at",
        params![
            snapshot.created,
            configuration,
            instance,
            state,
            next_id,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

fn insert_action(conn: &Connection, action: &Action) -> DbResult<i64> {
    conn.execute(
        "INSERT INTO actions (action_type, options, result, time) VALUES (?1, ?2, ?3, ?4)",
        params![
            action.action_type.as_str(),
            serde_json::to_string(&action.options)?,
            serde_json::to_string(&action.result)?,
            action.time
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
