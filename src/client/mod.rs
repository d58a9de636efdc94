//! The `client` module is the public face of the crate.
//!
//! It provides [`Client`], which owns the outbound pipeline and the inbound
//! [`MessageReceiver`], and the types callers use to talk to it.

pub mod delivery_client;
pub mod receiver;

pub use delivery_client::{Client, LifecycleState, PublishOptions};
pub use receiver::{DispatchReport, Handler, MessageReceiver, handler};
