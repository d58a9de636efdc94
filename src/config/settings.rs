use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::utils::ClientError;

/// Top-level configuration settings for the application.
///
/// Includes the remote endpoint, pipeline tuning, offline storage, timeouts
/// and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub endpoint: EndpointSettings,
    pub client: PipelineSettings,
    pub offline: OfflineSettings,
    pub timeouts: TimeoutSettings,
    pub logging: LoggingSettings,
}

/// Where the remote message endpoint lives and how to authenticate to it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EndpointSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Batching and polling parameters as they appear in configuration files.
///
/// Durations are expressed in milliseconds here; [`Settings::client_settings`]
/// turns them into the typed [`ClientSettings`] used by the client.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PipelineSettings {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub min_batch_interval_ms: u64,
    pub max_batch_interval_ms: u64,
    pub max_queue_size: usize,
    pub check_msg_rate_ms: u64,
    pub check_msg_limit: usize,
}

/// Spillover storage for messages that cannot be delivered right away.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OfflineSettings {
    pub enabled: bool,
    pub path: PathBuf,
    pub ttl_secs: u64,
}

/// Per-call timeouts, in milliseconds.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TimeoutSettings {
    pub send_ms: u64,
    pub batch_ms: u64,
    pub poll_ms: u64,
    pub probe_ms: u64,
    pub presence_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub endpoint: Option<PartialEndpointSettings>,
    pub client: Option<PartialPipelineSettings>,
    pub offline: Option<PartialOfflineSettings>,
    pub timeouts: Option<PartialTimeoutSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialEndpointSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialPipelineSettings {
    pub min_batch_size: Option<usize>,
    pub max_batch_size: Option<usize>,
    pub min_batch_interval_ms: Option<u64>,
    pub max_batch_interval_ms: Option<u64>,
    pub max_queue_size: Option<usize>,
    pub check_msg_rate_ms: Option<u64>,
    pub check_msg_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialOfflineSettings {
    pub enabled: Option<bool>,
    pub path: Option<PathBuf>,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialTimeoutSettings {
    pub send_ms: Option<u64>,
    pub batch_ms: Option<u64>,
    pub poll_ms: Option<u64>,
    pub probe_ms: Option<u64>,
    pub presence_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings {
                base_url: "http://127.0.0.1:8080/api".to_string(),
                api_key: None,
            },
            client: PipelineSettings {
                min_batch_size: 10,
                max_batch_size: 100,
                min_batch_interval_ms: 100,
                max_batch_interval_ms: 1000,
                max_queue_size: 1000,
                check_msg_rate_ms: 3000,
                check_msg_limit: 1,
            },
            offline: OfflineSettings {
                enabled: false,
                path: PathBuf::from("courier_offline_db"),
                ttl_secs: 24 * 60 * 60,
            },
            timeouts: TimeoutSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            send_ms: 5_000,
            batch_ms: 30_000,
            poll_ms: 5_000,
            probe_ms: 2_000,
            presence_ms: 5_000,
        }
    }
}

impl TimeoutSettings {
    pub fn send(&self) -> Duration {
        Duration::from_millis(self.send_ms)
    }

    pub fn batch(&self) -> Duration {
        Duration::from_millis(self.batch_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn presence(&self) -> Duration {
        Duration::from_millis(self.presence_ms)
    }
}

/// Typed settings consumed by [`crate::client::Client`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Advisory lower bound for a batch; a timer tick may send fewer.
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub min_batch_interval: Duration,
    pub max_batch_interval: Duration,
    pub max_queue_size: usize,
    pub check_msg_rate: Duration,
    pub check_msg_limit: usize,
    pub offline_storage_enabled: bool,
    pub offline_ttl: Duration,
    pub timeouts: TimeoutSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Settings::default().client_settings()
    }
}

impl ClientSettings {
    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.max_batch_size == 0 {
            return Err(ClientError::validation("max_batch_size must be positive"));
        }
        if self.max_queue_size == 0 {
            return Err(ClientError::validation("max_queue_size must be positive"));
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(ClientError::validation(format!(
                "min_batch_size ({}) exceeds max_batch_size ({})",
                self.min_batch_size, self.max_batch_size
            )));
        }
        if self.min_batch_interval.is_zero() {
            return Err(ClientError::validation("min_batch_interval must be positive"));
        }
        if self.min_batch_interval > self.max_batch_interval {
            return Err(ClientError::validation(
                "min_batch_interval exceeds max_batch_interval",
            ));
        }
        if self.check_msg_rate.is_zero() {
            return Err(ClientError::validation("check_msg_rate must be positive"));
        }
        if self.check_msg_limit == 0 {
            return Err(ClientError::validation("check_msg_limit must be positive"));
        }
        // A zero TTL writes records that are already expired.
        if self.offline_storage_enabled && self.offline_ttl.is_zero() {
            return Err(ClientError::validation("offline_ttl must be positive"));
        }
        Ok(())
    }
}

impl Settings {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            min_batch_size: self.client.min_batch_size,
            max_batch_size: self.client.max_batch_size,
            min_batch_interval: Duration::from_millis(self.client.min_batch_interval_ms),
            max_batch_interval: Duration::from_millis(self.client.max_batch_interval_ms),
            max_queue_size: self.client.max_queue_size,
            check_msg_rate: Duration::from_millis(self.client.check_msg_rate_ms),
            check_msg_limit: self.client.check_msg_limit,
            offline_storage_enabled: self.offline.enabled,
            offline_ttl: Duration::from_secs(self.offline.ttl_secs),
            timeouts: self.timeouts,
        }
    }
}
