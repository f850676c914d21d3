//! Correlated transport between an embedded lab and its host
//!
//! Both ends wrap a [`crate::channel::Channel`] in a [`MessageProcessor`],
//! which turns one-way posts into request/response pairs. The lab side is a
//! [`ChannelLabHost`]; the host side is a [`HostServer`] driving a
//! [`LabEventProcessor`].

mod client;
mod gate;
mod processor;
mod server;

#[cfg(test)]
mod proptests;

pub use client::ChannelLabHost;
pub use gate::{EventGate, GateState, REJECTED_BEFORE_CONNECTION};
pub use processor::{MessageHandler, MessageProcessor, Responder};
pub use server::{HostServer, LabEventProcessor, LedgerProcessor};
