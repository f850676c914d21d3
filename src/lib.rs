//! Labs session engine
//!
//! An embedded lab records every interaction as an action in a host-side
//! ledger, talks to that host over a correlated request/response transport,
//! and rebuilds attempt state by replaying the ledger.

pub mod attempt;
pub mod channel;
pub mod components;
pub mod db;
pub mod error;
pub mod events;
pub mod host;
pub mod ledger;
pub mod model;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod transport;

pub use error::{ErrorKind, LabError, LabResult};
pub use ledger::Ledger;
pub use session::{LabEditor, LabInstance, LabSession};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
