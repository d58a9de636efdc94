//! The `persistence` module provides durable spillover for messages that
//! could not be delivered immediately.
//!
//! Records carry an absolute expiry and are replayed once connectivity
//! returns. The pipeline talks to storage only through [`OfflineStore`];
//! [`sled_store::SledOfflineStore`] is the embedded `sled` implementation.

pub mod sled_store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::StorageError;

pub use sled_store::SledOfflineStore;

/// A spilled message as held by the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OfflineRecord {
    pub id: String,
    /// Serialized message body.
    pub data: String,
    /// Serialized tag list, if the message had tags.
    pub tags: Option<String>,
    /// Absolute expiry, epoch milliseconds.
    pub expires_at: i64,
}

impl OfflineRecord {
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

static RECORD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a record id. Ids start with the creation time and a process-wide
/// sequence number so that key-ordered stores iterate oldest first.
pub fn new_record_id() -> String {
    let seq = RECORD_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{:020}-{:012}-{}",
        Utc::now().timestamp_millis(),
        seq,
        Uuid::new_v4().simple()
    )
}

/// Durable key-value capability used for spillover.
///
/// Implementations are responsible for their own consistency: they are
/// called concurrently from the sender loop and from manual replays.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    async fn put(
        &self,
        id: &str,
        data: &str,
        tags: Option<&str>,
        ttl: Duration,
    ) -> Result<(), StorageError>;

    /// Non-expired records, oldest first, capped at `limit` when given.
    async fn list_live(&self, limit: Option<usize>) -> Result<Vec<OfflineRecord>, StorageError>;

    async fn delete_many(&self, ids: &[String]) -> Result<(), StorageError>;

    async fn count_live(&self) -> Result<usize, StorageError>;

    /// Remove expired records and return how many were dropped.
    async fn purge_expired(&self) -> Result<usize, StorageError>;

    /// Make previous writes durable. Stores without buffering need not
    /// override this.
    async fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
