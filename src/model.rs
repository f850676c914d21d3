//! Data model shared by the ledger, the transport and the attempt layer
//!
//! Every type here serializes to the `camelCase` wire shape the host and the
//! embedded lab exchange, so the same structs travel over the channel and
//! into the SQLite journal unchanged.

mod action;
mod configuration;
mod value_map;

pub use action::*;
pub use configuration::*;
pub use value_map::ValueMap;
