//! Scripted test doubles shared by the unit and scenario tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::ClientSettings;
use crate::message::{CheckMessage, Message, MessageId};
use crate::persistence::{OfflineRecord, OfflineStore};
use crate::transport::Transport;
use crate::utils::{StorageError, TransportError};

/// Transport whose behaviour is driven by flags and scripted results.
///
/// While `reachable` is false every call fails with a network error.
pub struct MockTransport {
    reachable: AtomicBool,
    fail_sends: AtomicBool,
    hang_probes: AtomicBool,
    hang_batches: AtomicBool,
    batch_results: Mutex<VecDeque<Result<(), TransportError>>>,
    inbox: Mutex<VecDeque<Result<Vec<CheckMessage>, TransportError>>>,
    pub sent: Mutex<Vec<Message>>,
    pub batches: Mutex<Vec<Vec<Message>>>,
    pub presence: Mutex<Vec<bool>>,
    pub probes: AtomicUsize,
    pub polls: AtomicUsize,
    pub poll_limits: Mutex<Vec<usize>>,
    next_id: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            hang_probes: AtomicBool::new(false),
            hang_batches: AtomicBool::new(false),
            batch_results: Mutex::new(VecDeque::new()),
            inbox: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            presence: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            poll_limits: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn unreachable() -> Self {
        let transport = Self::new();
        transport.set_reachable(false);
        transport
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make `send_one` fail while the endpoint stays reachable.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make `probe` never complete, ignoring its timeout.
    pub fn hang_probes(&self, hang: bool) {
        self.hang_probes.store(hang, Ordering::SeqCst);
    }

    /// Make `send_batch` never complete, ignoring its timeout.
    pub fn hang_batches(&self, hang: bool) {
        self.hang_batches.store(hang, Ordering::SeqCst);
    }

    /// Queue the outcome of the next `send_batch` calls. Unscripted calls
    /// succeed.
    pub fn script_batches<I>(&self, results: I)
    where
        I: IntoIterator<Item = Result<(), TransportError>>,
    {
        self.batch_results.lock().unwrap().extend(results);
    }

    /// Queue the result of the next poll. Unscripted polls return nothing.
    pub fn push_poll(&self, result: Result<Vec<CheckMessage>, TransportError>) {
        self.inbox.lock().unwrap().push_back(result);
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// Every message delivered through `send_batch`, in delivery order.
    pub fn delivered(&self) -> Vec<Message> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), TransportError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Network("connection refused".into()))
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_one(
        &self,
        message: &Message,
        _timeout: Duration,
    ) -> Result<MessageId, TransportError> {
        self.check_reachable()?;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Status(500));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(format!("id-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn send_batch(
        &self,
        messages: &[Message],
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        if self.hang_batches.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.check_reachable()?;
        let scripted = self.batch_results.lock().unwrap().pop_front();
        if let Some(Err(e)) = scripted {
            return Err(e);
        }
        self.batches.lock().unwrap().push(messages.to_vec());
        Ok(())
    }

    async fn poll(
        &self,
        limit: usize,
        _timeout: Duration,
    ) -> Result<Vec<CheckMessage>, TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.poll_limits.lock().unwrap().push(limit);
        self.check_reachable()?;
        self.inbox
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn set_presence(&self, online: bool, _timeout: Duration) -> Result<(), TransportError> {
        self.presence.lock().unwrap().push(online);
        self.check_reachable()
    }

    async fn probe(&self, _timeout: Duration) -> Result<(), TransportError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.hang_probes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.check_reachable()
    }
}

/// In-memory offline store with read and write failure switches.
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, OfflineRecord>>,
    fail_puts: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make `list_live` and `count_live` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("read failed".into()));
        }
        Ok(())
    }

    /// Insert a record verbatim, bypassing any encoding.
    pub fn insert_raw(&self, record: OfflineRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl OfflineStore for MemoryStore {
    async fn put(
        &self,
        id: &str,
        data: &str,
        tags: Option<&str>,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("disk full".into()));
        }
        self.insert_raw(OfflineRecord {
            id: id.to_string(),
            data: data.to_string(),
            tags: tags.map(str::to_string),
            expires_at: Utc::now().timestamp_millis() + ttl.as_millis() as i64,
        });
        Ok(())
    }

    async fn list_live(&self, limit: Option<usize>) -> Result<Vec<OfflineRecord>, StorageError> {
        self.check_reads()?;
        let now = Utc::now().timestamp_millis();
        let records = self.records.lock().unwrap();
        let live = records.values().filter(|r| r.is_live(now)).cloned();
        Ok(match limit {
            Some(n) => live.take(n).collect(),
            None => live.collect(),
        })
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap();
        for id in ids {
            records.remove(id);
        }
        Ok(())
    }

    async fn count_live(&self) -> Result<usize, StorageError> {
        self.check_reads()?;
        let now = Utc::now().timestamp_millis();
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_live(now))
            .count())
    }

    async fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now().timestamp_millis();
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| r.is_live(now));
        Ok(before - records.len())
    }
}

/// Client settings with short intervals, suited to paused-clock tests.
pub fn fast_settings() -> ClientSettings {
    ClientSettings {
        min_batch_size: 1,
        max_batch_size: 10,
        min_batch_interval: Duration::from_millis(100),
        max_batch_interval: Duration::from_millis(1000),
        max_queue_size: 100,
        check_msg_rate: Duration::from_millis(500),
        check_msg_limit: 1,
        offline_storage_enabled: false,
        ..ClientSettings::default()
    }
}

pub fn offline_settings() -> ClientSettings {
    ClientSettings {
        offline_storage_enabled: true,
        ..fast_settings()
    }
}
