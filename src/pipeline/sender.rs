//! The recurring task that drains the batcher into the transport.
//!
//! Each tick refreshes the connection state (replaying the offline store on
//! reconnect), sends at most one batch, and diverts that batch to the
//! offline store when it cannot be delivered. Expiry cleanup runs on its own
//! coarser cadence. A tick never fails: every error is logged and the data
//! stays queued or spilled for a later attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::batcher::Batcher;
use super::connection::ConnectionMonitor;
use super::replay::{OfflineSpool, ReplayReport};
use crate::message::Message;
use crate::transport::{Transport, within};

/// How often expired offline records are purged.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub spilled: usize,
    pub dropped: usize,
    pub purged: usize,
    pub replay: Option<ReplayReport>,
}

pub struct SenderLoop {
    batcher: Arc<Batcher>,
    monitor: Arc<ConnectionMonitor>,
    transport: Arc<dyn Transport>,
    spool: Option<Arc<OfflineSpool>>,
    batch_timeout: Duration,
    maintenance_interval: Duration,
    last_reachable: bool,
    last_maintenance: Instant,
}

impl SenderLoop {
    pub fn new(
        batcher: Arc<Batcher>,
        monitor: Arc<ConnectionMonitor>,
        transport: Arc<dyn Transport>,
        spool: Option<Arc<OfflineSpool>>,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            last_reachable: monitor.is_reachable(),
            batcher,
            monitor,
            transport,
            spool,
            batch_timeout,
            maintenance_interval: MAINTENANCE_INTERVAL,
            last_maintenance: Instant::now(),
        }
    }

    /// Tick until `shutdown` flips to true or its sender is dropped. The
    /// period is re-read from the batcher before every tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Sender loop started");
        loop {
            let interval = self.batcher.next_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            self.tick().await;
        }
        info!("Sender loop stopped");
    }

    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let reachable = self.monitor.check_state().await;
        if reachable && !self.last_reachable {
            if let Some(spool) = &self.spool {
                info!("Connection restored, replaying offline messages");
                report.replay = Some(spool.replay(&*self.transport, self.batch_timeout).await);
            }
        }
        self.last_reachable = reachable;

        let batch = self.batcher.take_batch();
        if !batch.is_empty() {
            self.deliver(batch, reachable, &mut report).await;
        }

        if self.last_maintenance.elapsed() >= self.maintenance_interval {
            self.last_maintenance = Instant::now();
            if let Some(spool) = &self.spool {
                report.purged = spool.purge_expired().await;
                if reachable && report.replay.is_none() && spool.pending().await > 0 {
                    report.replay =
                        Some(spool.replay(&*self.transport, self.batch_timeout).await);
                }
            }
        }

        report
    }

    async fn deliver(&self, batch: Vec<Message>, reachable: bool, report: &mut TickReport) {
        if !reachable {
            debug!(count = batch.len(), "Endpoint unreachable, not sending batch");
            self.divert(batch, report).await;
            return;
        }

        let min_batch_size = self.batcher.limits().min_batch_size;
        if batch.len() < min_batch_size {
            trace!(count = batch.len(), min_batch_size, "Sending undersized batch");
        }

        let send = self.transport.send_batch(&batch, self.batch_timeout);
        match within(self.batch_timeout, send).await {
            Ok(()) => {
                debug!(count = batch.len(), "Batch delivered");
                report.sent = batch.len();
            }
            Err(e) => {
                warn!(error = %e, count = batch.len(), "Batch send failed");
                self.divert(batch, report).await;
            }
        }
    }

    async fn divert(&self, batch: Vec<Message>, report: &mut TickReport) {
        match &self.spool {
            Some(spool) => {
                let stored = spool.spill(&batch).await;
                report.spilled = stored;
                report.dropped = batch.len() - stored;
            }
            None => {
                error!(
                    count = batch.len(),
                    "Batch undeliverable and offline storage disabled, messages lost"
                );
                report.dropped = batch.len();
            }
        }
    }
}
