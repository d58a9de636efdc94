//! Demo agent
//!
//! Loads configuration, connects a `Client` to the configured endpoint over
//! HTTP, logs every inbound message and sends a heartbeat every 30 seconds
//! until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use courier::config::{Settings, load_config};
use courier::transport::HttpTransport;
use courier::utils::logging;
use courier::{Client, HeartbeatStats, IncomingMessage, handler};
use tracing::{error, info};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    logging::init(&config.logging.level);

    if let Err(e) = run(config).await {
        error!("Agent failed: {}", e);
    }
}

async fn run(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(HttpTransport::from_settings(&config.endpoint));
    info!(endpoint = %transport.base_url(), "Starting courier agent");

    let client = Client::from_settings(&config, transport)?;
    client.set_handler(Some(handler(|message: IncomingMessage| {
        info!(
            msg_type = %message.msg_type,
            source = %message.source,
            tags = ?message.tags(),
            "Received message"
        );
        Ok(())
    })));

    client.start().await;

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                match client.send_heartbeat(HeartbeatStats::default()).await {
                    Ok(Some(id)) => info!(id = %id, "Heartbeat acknowledged"),
                    Ok(None) => info!("Heartbeat not delivered"),
                    Err(e) => error!("Heartbeat rejected: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting gracefully.");
                break;
            }
        }
    }

    client.stop().await;
    info!(
        queued = client.queue_len(),
        offline = client.pending_offline().await,
        "Agent stopped"
    );
    Ok(())
}
