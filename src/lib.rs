//! # Courier
//!
//! `courier` is the client side of the message relay: it accepts messages from
//! the application, batches them adaptively for delivery to a remote
//! endpoint, and keeps undelivered messages in a local `sled` store until
//! connectivity returns. A parallel receiver polls the endpoint for
//! server-pushed messages and hands them to a single registered handler.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `client`: The `Client` facade with its start/stop lifecycle, and the inbound message receiver.
//! - `config`: Loads settings from an optional file and `COURIER__*` environment variables.
//! - `message`: Outbound messages, heartbeats and the normalized inbound message shape.
//! - `persistence`: The `OfflineStore` capability and its `sled`-backed implementation.
//! - `pipeline`: The batcher, connection monitor, offline replay and sender loop.
//! - `transport`: The `Transport` capability and its HTTP implementation.
//! - `utils`: Error types and logging setup.

pub mod client;
pub mod config;
pub mod message;
pub mod persistence;
pub mod pipeline;
pub mod transport;
pub mod utils;

pub use client::{Client, Handler, LifecycleState, PublishOptions, handler};
pub use message::{HeartbeatStats, IncomingMessage, Message, MessageId};

#[cfg(test)]
mod tests;
