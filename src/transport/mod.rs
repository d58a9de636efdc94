//! The `transport` module is responsible for network communication with the
//! remote message endpoint.
//!
//! It defines the [`Transport`] capability the pipeline consumes, the wire
//! bodies exchanged with the endpoint, and [`http::HttpTransport`], the
//! `reqwest`-backed implementation used by the agent binary.

pub mod http;
pub mod message;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::message::{CheckMessage, Message, MessageId};
use crate::utils::TransportError;

pub use http::HttpTransport;

/// Abstract connection to the remote endpoint.
///
/// Every call carries its own timeout; implementations must not block past
/// it. Callers inside the pipeline never propagate these errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a single message and return the id the endpoint assigned.
    async fn send_one(&self, message: &Message, timeout: Duration)
    -> Result<MessageId, TransportError>;

    /// Send several messages in one request.
    async fn send_batch(&self, messages: &[Message], timeout: Duration)
    -> Result<(), TransportError>;

    /// Fetch up to `limit` pending inbound messages. An empty vec means the
    /// endpoint had nothing to deliver.
    async fn poll(&self, limit: usize, timeout: Duration)
    -> Result<Vec<CheckMessage>, TransportError>;

    /// Report this client as online or offline.
    async fn set_presence(&self, online: bool, timeout: Duration) -> Result<(), TransportError>;

    /// Lightweight reachability check.
    async fn probe(&self, timeout: Duration) -> Result<(), TransportError>;
}

/// Await a transport call, failing with [`TransportError::Timeout`] once
/// `limit` has elapsed even if the implementation ignores its own timeout.
pub(crate) async fn within<T, F>(limit: Duration, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(TransportError::Timeout))
}

#[cfg(test)]
mod tests;
