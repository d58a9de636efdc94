//! The `message` module defines the payloads that flow through the pipeline.
//!
//! Outbound [`Message`]s are built by the client's publish and heartbeat
//! paths. Inbound records arrive from the transport as [`CheckMessage`] and
//! are normalized into [`IncomingMessage`] before reaching the handler.

pub mod inbound;
pub mod outbound;

pub use inbound::{CheckMessage, IncomingContext, IncomingMessage};
pub use outbound::{HeartbeatStats, Message, MessageContext, MessageId, MessageType};
