//! Client facade
//!
//! `Client` wires the batcher, connection monitor, offline spool, sender loop
//! and message receiver into one value with a start/stop lifecycle. It is a
//! cheap handle around shared state: clone it to use the same client from
//! several places.
//!
//! Lifecycle:
//! - `start()` flips to `Running`, spawns the sender loop (and the receiver
//!   if a handler is registered), then announces presence.
//! - `stop()` flips to `Stopped`, signals both loops, announces absence and
//!   flushes the offline store.
//!   A tick already in flight completes; its I/O is bounded by the per-call
//!   timeouts rather than aborted.
//!
//! `publish_wait` and `send_heartbeat` go straight to the transport and work
//! in either state.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::receiver::{DispatchReport, Handler, MessageReceiver};
use crate::config::{ClientSettings, Settings};
use crate::message::{HeartbeatStats, Message, MessageId, MessageType};
use crate::persistence::{OfflineStore, SledOfflineStore};
use crate::pipeline::{
    BatchLimits, Batcher, ConnectionMonitor, OfflineSpool, ReplayReport, SenderLoop,
};
use crate::transport::{Transport, within};
use crate::utils::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
}

/// Optional fields for a publish.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOptions {
    pub tags: Vec<String>,
    pub dest: Option<String>,
}

impl PublishOptions {
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            dest: None,
        }
    }

    pub fn with_dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }
}

/// A spawned loop and the means to stop it.
struct LoopHandle {
    shutdown: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

impl LoopHandle {
    fn spawn<F, Fut>(runtime: &Handle, body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        let task = runtime.spawn(body(rx));
        Self {
            shutdown,
            _task: task,
        }
    }

    /// Stop scheduling ticks. A tick already running is left to finish.
    fn stop(self) {
        let _ = self.shutdown.send(true);
    }
}

struct Lifecycle {
    state: LifecycleState,
    poll_rate: Duration,
    runtime: Option<Handle>,
    sender: Option<LoopHandle>,
    receiver: Option<LoopHandle>,
}

struct Inner {
    settings: ClientSettings,
    transport: Arc<dyn Transport>,
    batcher: Arc<Batcher>,
    monitor: Arc<ConnectionMonitor>,
    spool: Option<Arc<OfflineSpool>>,
    receiver: Arc<MessageReceiver>,
    lifecycle: Mutex<Lifecycle>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Build a client. No background work starts until [`Client::start`].
    ///
    /// `store` is used only when `settings.offline_storage_enabled` is set,
    /// and is then required.
    pub fn new(
        settings: ClientSettings,
        transport: Arc<dyn Transport>,
        store: Option<Arc<dyn OfflineStore>>,
    ) -> Result<Self, ClientError> {
        settings.validate()?;

        let spool = match (settings.offline_storage_enabled, store) {
            (true, Some(store)) => Some(Arc::new(OfflineSpool::new(store, settings.offline_ttl))),
            (true, None) => {
                return Err(ClientError::validation(
                    "offline storage is enabled but no store was provided",
                ));
            }
            (false, Some(_)) => {
                debug!("Offline storage disabled, ignoring provided store");
                None
            }
            (false, None) => None,
        };

        let monitor = Arc::new(ConnectionMonitor::new(
            transport.clone(),
            settings.timeouts.probe(),
        ));
        let receiver = Arc::new(MessageReceiver::new(
            transport.clone(),
            monitor.clone(),
            settings.check_msg_limit,
            settings.timeouts.poll(),
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                batcher: Arc::new(Batcher::new(BatchLimits::from(&settings))),
                lifecycle: Mutex::new(Lifecycle {
                    state: LifecycleState::Stopped,
                    poll_rate: settings.check_msg_rate,
                    runtime: None,
                    sender: None,
                    receiver: None,
                }),
                settings,
                transport,
                monitor,
                spool,
                receiver,
            }),
        })
    }

    /// Build a client from loaded configuration, opening the sled offline
    /// store when offline storage is enabled.
    pub fn from_settings(
        settings: &Settings,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let client_settings = settings.client_settings();
        let store: Option<Arc<dyn OfflineStore>> = if client_settings.offline_storage_enabled {
            Some(Arc::new(SledOfflineStore::open(&settings.offline.path)?))
        } else {
            None
        };
        Self::new(client_settings, transport, store)
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Start the background loops. No-op when already running.
    ///
    /// Must be called from within a tokio runtime; the loops are spawned on
    /// it.
    pub async fn start(&self) {
        {
            let mut lifecycle = self.inner.lifecycle();
            if lifecycle.state == LifecycleState::Running {
                debug!("Client already running");
                return;
            }

            let runtime = Handle::current();
            lifecycle.state = LifecycleState::Running;
            lifecycle.sender = Some(self.inner.spawn_sender(&runtime));
            if self.inner.receiver.has_handler() {
                lifecycle.receiver =
                    Some(self.inner.spawn_receiver(&runtime, lifecycle.poll_rate));
            }
            lifecycle.runtime = Some(runtime);
        }

        info!("Client started");
        self.inner.announce(true).await;
    }

    /// Stop the background loops and flush the offline store. No-op when
    /// already stopped.
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.inner.lifecycle();
            if lifecycle.state == LifecycleState::Stopped {
                debug!("Client already stopped");
                return;
            }

            lifecycle.state = LifecycleState::Stopped;
            if let Some(sender) = lifecycle.sender.take() {
                sender.stop();
            }
            if let Some(receiver) = lifecycle.receiver.take() {
                receiver.stop();
            }
            lifecycle.runtime = None;
        }

        info!("Client stopped");
        self.inner.announce(false).await;
        if let Some(spool) = &self.inner.spool {
            spool.flush().await;
        }
    }

    /// Queue `data` for batched delivery.
    ///
    /// When the queue is full the message is spilled to the offline store,
    /// or discarded when there is none. Never fails.
    pub async fn publish(&self, data: Value, options: PublishOptions) {
        let message = Message::publish(data, options.tags, options.dest);
        self.inner.enqueue(message).await;
    }

    /// Send `data` immediately and wait for the id the endpoint assigns.
    ///
    /// Returns `None` on any delivery failure. The queue is not touched.
    pub async fn publish_wait(&self, data: Value, options: PublishOptions) -> Option<MessageId> {
        let message = Message::publish(data, options.tags, options.dest).with_wait();
        self.inner.send_now(&message).await
    }

    /// Queue a prebuilt message. Heartbeats are rejected: they are only ever
    /// sent immediately through [`Client::send_heartbeat`].
    pub async fn publish_message(&self, message: Message) -> Result<(), ClientError> {
        if message.msg_type != MessageType::Publish {
            return Err(ClientError::validation(format!(
                "only publish messages can be queued, got {:?}",
                message.msg_type
            )));
        }
        self.inner.enqueue(message).await;
        Ok(())
    }

    /// Send a heartbeat immediately.
    ///
    /// Fails with a validation error, before any network call, if a provided
    /// figure is negative. Delivery failures yield `Ok(None)`.
    pub async fn send_heartbeat(
        &self,
        stats: HeartbeatStats,
    ) -> Result<Option<MessageId>, ClientError> {
        stats.validate()?;
        let message = Message::heartbeat(&stats);
        Ok(self.inner.send_now(&message).await)
    }

    /// Replace the inbound handler. While running, the receiver is restarted
    /// with the new handler, or stopped when `handler` is `None`.
    pub fn set_handler(&self, handler: Option<Handler>) {
        self.inner.receiver.set_handler(handler);
        self.inner.restart_receiver();
    }

    /// Change the polling period. While running, the receiver restarts with
    /// the new period.
    pub fn set_poll_rate(&self, rate: Duration) -> Result<(), ClientError> {
        if rate.is_zero() {
            return Err(ClientError::validation("poll rate must be positive"));
        }
        self.inner.lifecycle().poll_rate = rate;
        self.inner.restart_receiver();
        Ok(())
    }

    /// Change how many messages each poll asks for. Applies from the next poll.
    pub fn set_poll_limit(&self, limit: usize) -> Result<(), ClientError> {
        if limit == 0 {
            return Err(ClientError::validation("poll limit must be positive"));
        }
        self.inner.receiver.set_limit(limit);
        Ok(())
    }

    pub fn poll_rate(&self) -> Duration {
        self.inner.lifecycle().poll_rate
    }

    pub fn poll_limit(&self) -> usize {
        self.inner.receiver.limit()
    }

    /// Poll once now, outside the schedule, through the same dispatch path
    /// as the receiver loop.
    pub async fn check_now(&self, limit: Option<usize>) -> DispatchReport {
        self.inner.receiver.check(limit).await
    }

    /// Current reachability, probing if the cooldown window has elapsed.
    pub async fn check_connection(&self) -> bool {
        self.inner.monitor.check_state().await
    }

    /// Reachable and running.
    pub fn is_connected(&self) -> bool {
        self.inner.monitor.is_reachable() && self.is_running()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.batcher.len()
    }

    /// Live records waiting in the offline store.
    pub async fn pending_offline(&self) -> usize {
        match &self.inner.spool {
            Some(spool) => spool.pending().await,
            None => 0,
        }
    }

    /// Replay the offline store now. Without offline storage this does nothing.
    pub async fn replay_offline(&self) -> ReplayReport {
        match &self.inner.spool {
            Some(spool) => {
                spool
                    .replay(&*self.inner.transport, self.inner.settings.timeouts.batch())
                    .await
            }
            None => ReplayReport::default(),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("queue_len", &self.queue_len())
            .field("offline_storage", &self.inner.spool.is_some())
            .finish()
    }
}

impl Inner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_sender(&self, runtime: &Handle) -> LoopHandle {
        let sender = SenderLoop::new(
            self.batcher.clone(),
            self.monitor.clone(),
            self.transport.clone(),
            self.spool.clone(),
            self.settings.timeouts.batch(),
        );
        LoopHandle::spawn(runtime, move |shutdown| sender.run(shutdown))
    }

    fn spawn_receiver(&self, runtime: &Handle, rate: Duration) -> LoopHandle {
        let receiver = self.receiver.clone();
        LoopHandle::spawn(runtime, move |shutdown| receiver.run(rate, shutdown))
    }

    fn restart_receiver(&self) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != LifecycleState::Running {
            return;
        }
        if let Some(receiver) = lifecycle.receiver.take() {
            receiver.stop();
        }
        if !self.receiver.has_handler() {
            return;
        }
        if let Some(runtime) = lifecycle.runtime.clone() {
            let rate = lifecycle.poll_rate;
            lifecycle.receiver = Some(self.spawn_receiver(&runtime, rate));
        }
    }

    async fn enqueue(&self, message: Message) {
        let Err(message) = self.batcher.enqueue(message) else {
            return;
        };
        match &self.spool {
            Some(spool) => {
                debug!("Queue full, spilling message to offline store");
                spool.spill(std::slice::from_ref(&message)).await;
            }
            None => debug!(
                max_queue_size = self.settings.max_queue_size,
                "Queue full, message discarded"
            ),
        }
    }

    async fn send_now(&self, message: &Message) -> Option<MessageId> {
        let limit = self.settings.timeouts.send();
        match within(limit, self.transport.send_one(message, limit)).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, msg_type = ?message.msg_type, "Immediate send failed");
                None
            }
        }
    }

    async fn announce(&self, online: bool) {
        let limit = self.settings.timeouts.presence();
        if let Err(e) = within(limit, self.transport.set_presence(online, limit)).await {
            warn!(online, error = %e, "Failed to update presence");
        }
    }
}
