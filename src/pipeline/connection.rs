//! Reachability tracking for the remote endpoint.
//!
//! The monitor starts optimistic and only probes the endpoint once per
//! cooldown window, however often it is asked. Between probes it answers
//! from the cached state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::transport::{Transport, within};

/// Minimum spacing between two active probes.
pub const PROBE_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct ConnectionState {
    reachable: bool,
    last_probe: Option<Instant>,
}

pub struct ConnectionMonitor {
    transport: Arc<dyn Transport>,
    probe_timeout: Duration,
    cooldown: Duration,
    state: Mutex<ConnectionState>,
}

impl ConnectionMonitor {
    pub fn new(transport: Arc<dyn Transport>, probe_timeout: Duration) -> Self {
        Self::with_cooldown(transport, probe_timeout, PROBE_COOLDOWN)
    }

    pub fn with_cooldown(
        transport: Arc<dyn Transport>,
        probe_timeout: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            probe_timeout,
            cooldown,
            state: Mutex::new(ConnectionState {
                reachable: true,
                last_probe: None,
            }),
        }
    }

    /// Last known state, without any network activity.
    pub fn is_reachable(&self) -> bool {
        self.lock().reachable
    }

    /// Whether the next [`check_state`](Self::check_state) would probe.
    pub fn probe_due(&self) -> bool {
        let state = self.lock();
        Self::window_elapsed(&state, self.cooldown)
    }

    /// Return the current reachability, probing first if the cooldown window
    /// has elapsed.
    pub async fn check_state(&self) -> bool {
        {
            let mut state = self.lock();
            if !Self::window_elapsed(&state, self.cooldown) {
                return state.reachable;
            }
            // Claim the window before probing so concurrent callers reuse the
            // cached state instead of probing too.
            state.last_probe = Some(Instant::now());
        }

        let result = within(
            self.probe_timeout,
            self.transport.probe(self.probe_timeout),
        )
        .await;
        let reachable = match &result {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Reachability probe failed");
                false
            }
        };
        self.set(reachable);
        reachable
    }

    /// Record a passive observation, e.g. the outcome of an inbound poll.
    /// Does not affect the probe window.
    pub fn observe(&self, reachable: bool) {
        self.set(reachable);
    }

    fn set(&self, reachable: bool) {
        let previous = {
            let mut state = self.lock();
            std::mem::replace(&mut state.reachable, reachable)
        };
        match (previous, reachable) {
            (false, true) => info!("Endpoint reachable again"),
            (true, false) => warn!("Endpoint unreachable"),
            _ => {}
        }
    }

    fn window_elapsed(state: &ConnectionState, cooldown: Duration) -> bool {
        match state.last_probe {
            Some(at) => at.elapsed() >= cooldown,
            None => true,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("state", &*self.lock())
            .field("cooldown", &self.cooldown)
            .finish()
    }
}
