//! Offline store backed by `sled`
//!
//! Records live in a single tree keyed by record id. Ids are prefixed with
//! the creation timestamp, so a plain scan yields records oldest first and
//! replay keeps the original publish order as far as possible.
//!
//! Expired records are hidden from `list_live`/`count_live` immediately and
//! physically removed by `purge_expired`, which the sender loop calls on a
//! fixed cadence. Entries whose bytes cannot be decoded are treated as
//! expired.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sled::{Batch, Db, Tree};
use tracing::warn;

use super::{OfflineRecord, OfflineStore};
use crate::utils::StorageError;

const TREE_NAME: &str = "offline_messages";

#[derive(Clone)]
pub struct SledOfflineStore {
    db: Db,
    pub(super) tree: Tree,
}

impl SledOfflineStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open a store that lives only as long as the returned value.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { db, tree })
    }

    fn decode(key: &[u8], value: &[u8]) -> Option<OfflineRecord> {
        match serde_json::from_slice(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    key = %String::from_utf8_lossy(key),
                    error = %e,
                    "Unreadable offline record"
                );
                None
            }
        }
    }

    /// Live records in key order, stopping after `limit` when given. A
    /// failed read is returned rather than skipped.
    fn live_records(&self, limit: Option<usize>) -> Result<Vec<OfflineRecord>, StorageError> {
        let now = Utc::now().timestamp_millis();
        let limit = limit.unwrap_or(usize::MAX);
        let mut records = Vec::new();

        for entry in self.tree.iter() {
            if records.len() >= limit {
                break;
            }
            let (key, value) = entry?;
            if let Some(record) = Self::decode(&key, &value) {
                if record.is_live(now) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl OfflineStore for SledOfflineStore {
    async fn put(
        &self,
        id: &str,
        data: &str,
        tags: Option<&str>,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let record = OfflineRecord {
            id: id.to_string(),
            data: data.to_string(),
            tags: tags.map(str::to_string),
            expires_at: Utc::now().timestamp_millis().saturating_add(ttl_ms),
        };

        let serialized = serde_json::to_vec(&record)?;
        self.tree.insert(id.as_bytes(), serialized)?;
        Ok(())
    }

    async fn list_live(&self, limit: Option<usize>) -> Result<Vec<OfflineRecord>, StorageError> {
        self.live_records(limit)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), StorageError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut batch = Batch::default();
        for id in ids {
            batch.remove(id.as_bytes());
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    async fn count_live(&self) -> Result<usize, StorageError> {
        Ok(self.live_records(None)?.len())
    }

    async fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now().timestamp_millis();
        let mut batch = Batch::default();
        let mut removed = 0;

        for entry in self.tree.iter() {
            let (key, value) = entry?;
            let expired = match Self::decode(&key, &value) {
                Some(record) => !record.is_live(now),
                None => true,
            };
            if expired {
                batch.remove(key);
                removed += 1;
            }
        }

        if removed > 0 {
            self.tree.apply_batch(batch)?;
        }
        Ok(removed)
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SledOfflineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledOfflineStore")
            .field("db", &"sled::Db")
            .field("records", &self.tree.len())
            .finish()
    }
}
