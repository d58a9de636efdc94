mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    ClientSettings, EndpointSettings, LoggingSettings, OfflineSettings, PipelineSettings,
    Settings, TimeoutSettings,
};

/// Prefix for environment overrides, e.g. `COURIER__CLIENT__MAX_QUEUE_SIZE=50`.
pub const ENV_PREFIX: &str = "COURIER";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing every section of the configuration
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] but reads the optional file at `file` (extension
/// may be omitted, as with `config::File::with_name`).
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let endpoint = partial.endpoint.unwrap_or_default();
    let client = partial.client.unwrap_or_default();
    let offline = partial.offline.unwrap_or_default();
    let timeouts = partial.timeouts.unwrap_or_default();
    let logging = partial.logging.unwrap_or_default();

    Settings {
        endpoint: EndpointSettings {
            base_url: endpoint.base_url.unwrap_or(default.endpoint.base_url),
            api_key: endpoint.api_key.or(default.endpoint.api_key),
        },
        client: PipelineSettings {
            min_batch_size: client
                .min_batch_size
                .unwrap_or(default.client.min_batch_size),
            max_batch_size: client
                .max_batch_size
                .unwrap_or(default.client.max_batch_size),
            min_batch_interval_ms: client
                .min_batch_interval_ms
                .unwrap_or(default.client.min_batch_interval_ms),
            max_batch_interval_ms: client
                .max_batch_interval_ms
                .unwrap_or(default.client.max_batch_interval_ms),
            max_queue_size: client
                .max_queue_size
                .unwrap_or(default.client.max_queue_size),
            check_msg_rate_ms: client
                .check_msg_rate_ms
                .unwrap_or(default.client.check_msg_rate_ms),
            check_msg_limit: client
                .check_msg_limit
                .unwrap_or(default.client.check_msg_limit),
        },
        offline: OfflineSettings {
            enabled: offline.enabled.unwrap_or(default.offline.enabled),
            path: offline.path.unwrap_or(default.offline.path),
            ttl_secs: offline.ttl_secs.unwrap_or(default.offline.ttl_secs),
        },
        timeouts: TimeoutSettings {
            send_ms: timeouts.send_ms.unwrap_or(default.timeouts.send_ms),
            batch_ms: timeouts.batch_ms.unwrap_or(default.timeouts.batch_ms),
            poll_ms: timeouts.poll_ms.unwrap_or(default.timeouts.poll_ms),
            probe_ms: timeouts.probe_ms.unwrap_or(default.timeouts.probe_ms),
            presence_ms: timeouts
                .presence_ms
                .unwrap_or(default.timeouts.presence_ms),
        },
        logging: LoggingSettings {
            level: logging.level.unwrap_or(default.logging.level),
        },
    }
}
