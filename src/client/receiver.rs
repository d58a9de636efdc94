//! Inbound polling and dispatch.
//!
//! Scheduled polls and [`MessageReceiver::check`] share one code path. The
//! handler is called synchronously for each message in server order; a
//! rejection or panic is logged and never stops the rest of the batch.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::message::IncomingMessage;
use crate::pipeline::ConnectionMonitor;
use crate::transport::{Transport, within};
use crate::utils::HandlerError;

/// The single inbound callback. Registering a new one replaces the old.
pub type Handler = Arc<dyn Fn(IncomingMessage) -> Result<(), HandlerError> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(IncomingMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Counts from one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub received: usize,
    pub handled: usize,
    pub failed: usize,
}

pub struct MessageReceiver {
    transport: Arc<dyn Transport>,
    monitor: Arc<ConnectionMonitor>,
    handler: RwLock<Option<Handler>>,
    limit: AtomicUsize,
    poll_timeout: Duration,
}

impl MessageReceiver {
    pub fn new(
        transport: Arc<dyn Transport>,
        monitor: Arc<ConnectionMonitor>,
        limit: usize,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            monitor,
            handler: RwLock::new(None),
            limit: AtomicUsize::new(limit),
            poll_timeout,
        }
    }

    pub fn handler(&self) -> Option<Handler> {
        self.handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn has_handler(&self) -> bool {
        self.handler().is_some()
    }

    pub fn set_handler(&self, handler: Option<Handler>) {
        *self
            .handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = handler;
    }

    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    pub fn set_limit(&self, limit: usize) {
        self.limit.store(limit, Ordering::Relaxed);
    }

    /// Run one poll cycle. `limit` overrides the configured limit.
    ///
    /// Does nothing without a handler, so that polled messages are never
    /// consumed with nobody to receive them.
    pub async fn check(&self, limit: Option<usize>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(handler) = self.handler() else {
            debug!("No handler registered, skipping poll");
            return report;
        };

        let limit = limit.unwrap_or_else(|| self.limit());
        let poll = self.transport.poll(limit, self.poll_timeout);
        let records = match within(self.poll_timeout, poll).await {
            Ok(records) => {
                self.monitor.observe(true);
                records
            }
            Err(e) => {
                warn!(error = %e, "Polling for messages failed");
                self.monitor.observe(false);
                return report;
            }
        };

        report.received = records.len();
        for record in records {
            if Self::dispatch(&handler, IncomingMessage::from(record)) {
                report.handled += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.received > 0 {
            debug!(
                received = report.received,
                failed = report.failed,
                "Dispatched inbound messages"
            );
        }
        report
    }

    fn dispatch(handler: &Handler, message: IncomingMessage) -> bool {
        let msg_type = message.msg_type.clone();
        match catch_unwind(AssertUnwindSafe(|| (**handler)(message))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(msg_type = %msg_type, error = %e, "Handler rejected message");
                false
            }
            Err(_) => {
                error!(msg_type = %msg_type, "Handler panicked while processing message");
                false
            }
        }
    }

    /// Poll every `rate` until `shutdown` fires.
    pub async fn run(self: Arc<Self>, rate: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(rate_ms = rate.as_millis() as u64, "Message receiver started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(rate) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            self.check(None).await;
        }
        info!("Message receiver stopped");
    }
}
