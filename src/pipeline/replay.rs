//! Spillover to and replay from the offline store.
//!
//! Messages are split into two serialized parts when spilled: the body
//! (type, payload, timestamp, destination) and the tag list. Replay walks the
//! store in pages, rebuilds messages and resends them. A record is only
//! deleted once the batch carrying it has been accepted, or when it can no
//! longer be decoded.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::message::{Message, MessageContext, MessageType};
use crate::persistence::{OfflineRecord, OfflineStore, new_record_id};
use crate::transport::{Transport, within};
use crate::utils::StorageError;

/// Records sent per replay request.
pub const REPLAY_PAGE_SIZE: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
struct SpilledBody {
    msg_type: MessageType,
    data: Value,
    timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dest: Option<String>,
}

/// Outcome of one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records delivered and deleted.
    pub sent: usize,
    /// Undecodable records deleted without sending.
    pub discarded: usize,
    /// The run stopped early on a send or storage failure.
    pub aborted: bool,
}

pub struct OfflineSpool {
    store: Arc<dyn OfflineStore>,
    ttl: Duration,
    page_size: usize,
    replaying: Mutex<()>,
}

impl OfflineSpool {
    pub fn new(store: Arc<dyn OfflineStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            page_size: REPLAY_PAGE_SIZE,
            replaying: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Write `messages` to the store. Returns how many were stored; the rest
    /// are lost and logged as such.
    pub async fn spill(&self, messages: &[Message]) -> usize {
        let mut stored = 0;
        for message in messages {
            match self.spill_one(message).await {
                Ok(()) => stored += 1,
                Err(e) => error!(error = %e, "Failed to spill message, message lost"),
            }
        }
        if stored > 0 {
            debug!(count = stored, "Spilled messages to offline store");
        }
        stored
    }

    async fn spill_one(&self, message: &Message) -> Result<(), StorageError> {
        let (data, tags) = encode(message)?;
        self.store
            .put(&new_record_id(), &data, tags.as_deref(), self.ttl)
            .await
    }

    pub async fn pending(&self) -> usize {
        match self.store.count_live().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to count offline records");
                0
            }
        }
    }

    pub async fn flush(&self) {
        if let Err(e) = self.store.flush().await {
            warn!(error = %e, "Failed to flush offline store");
        }
    }

    pub async fn purge_expired(&self) -> usize {
        match self.store.purge_expired().await {
            Ok(removed) => {
                if removed > 0 {
                    info!(count = removed, "Purged expired offline records");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "Failed to purge offline store");
                0
            }
        }
    }

    /// Resend stored records page by page.
    ///
    /// Stops at the first page that cannot be delivered; its valid records
    /// stay in the store for the next run. Returns immediately if another
    /// replay is already in progress.
    pub async fn replay(&self, transport: &dyn Transport, timeout: Duration) -> ReplayReport {
        let Ok(_guard) = self.replaying.try_lock() else {
            debug!("Replay already running, skipping");
            return ReplayReport::default();
        };

        let mut report = ReplayReport::default();
        let mut remaining = match self.store.count_live().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to count offline records");
                report.aborted = true;
                return report;
            }
        };
        if remaining == 0 {
            return report;
        }
        info!(count = remaining, "Replaying offline messages");

        while remaining > 0 {
            let page = match self.store.list_live(Some(remaining.min(self.page_size))).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Failed to read offline records");
                    report.aborted = true;
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            remaining = remaining.saturating_sub(page.len());

            let (ids, messages, poisoned) = decode_page(page);

            let delivered = if messages.is_empty() {
                true
            } else {
                match within(timeout, transport.send_batch(&messages, timeout)).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, count = messages.len(), "Replay batch failed");
                        false
                    }
                }
            };

            let mut to_delete = poisoned;
            let discarded = to_delete.len();
            if delivered {
                to_delete.extend(ids.iter().cloned());
            }

            if let Err(e) = self.store.delete_many(&to_delete).await {
                // Delivered records stay behind and will be sent again.
                warn!(error = %e, "Failed to delete replayed records");
                report.aborted = true;
                break;
            }
            report.discarded += discarded;

            if !delivered {
                report.aborted = true;
                break;
            }
            report.sent += ids.len();
        }

        info!(
            sent = report.sent,
            discarded = report.discarded,
            aborted = report.aborted,
            "Offline replay finished"
        );
        report
    }
}

impl std::fmt::Debug for OfflineSpool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineSpool")
            .field("ttl", &self.ttl)
            .field("page_size", &self.page_size)
            .finish()
    }
}

pub(crate) fn encode(message: &Message) -> Result<(String, Option<String>), serde_json::Error> {
    let body = SpilledBody {
        msg_type: message.msg_type,
        data: message.data.clone(),
        timestamp: message.timestamp.clone(),
        dest: message.dest.clone(),
    };
    let data = serde_json::to_string(&body)?;
    let tags = match message.tags() {
        [] => None,
        tags => Some(serde_json::to_string(tags)?),
    };
    Ok((data, tags))
}

pub(crate) fn decode(record: &OfflineRecord) -> Result<Message, serde_json::Error> {
    let body: SpilledBody = serde_json::from_str(&record.data)?;
    let tags: Option<Vec<String>> = match &record.tags {
        Some(raw) => serde_json::from_str(raw)?,
        None => None,
    };

    Ok(Message {
        msg_type: body.msg_type,
        data: body.data,
        timestamp: body.timestamp,
        context: tags.map(|tags| MessageContext {
            tags: Some(tags),
            wait: None,
        }),
        dest: body.dest,
    })
}

/// Split a page into (decodable ids, their messages, poisoned ids).
fn decode_page(page: Vec<OfflineRecord>) -> (Vec<String>, Vec<Message>, Vec<String>) {
    let mut ids = Vec::with_capacity(page.len());
    let mut messages = Vec::with_capacity(page.len());
    let mut poisoned = Vec::new();

    for record in page {
        match decode(&record) {
            Ok(message) => {
                ids.push(record.id);
                messages.push(message);
            }
            Err(e) => {
                warn!(id = %record.id, error = %e, "Discarding corrupted offline record");
                poisoned.push(record.id);
            }
        }
    }
    (ids, messages, poisoned)
}
