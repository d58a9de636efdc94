use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::ClientError;

/// Identifier the remote endpoint assigns to an accepted message.
pub type MessageId = String;

/// Kind of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Heartbeat,
    Publish,
}

/// Optional routing metadata attached to an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,
}

/// Represents an outbound message in the delivery pipeline.
///
/// A message is immutable once built and is consumed exactly once, either by
/// the immediate-send path or by the batching queue.
///
/// # Fields
///
/// - `msg_type` - Heartbeat or publish.
/// - `data` - Arbitrary JSON payload supplied by the application.
/// - `timestamp` - RFC3339 UTC creation time.
/// - `context` - Optional tags and the wait-for-response flag.
/// - `dest` - Optional destination hint for the remote endpoint.
///
/// # Example
///
/// ```rust
/// use courier::message::Message;
/// use serde_json::json;
///
/// let msg = Message::publish(json!({"temp": 25}), vec!["sensor".into()], None);
/// assert_eq!(msg.tags(), ["sensor".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub msg_type: MessageType,
    pub data: Value,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
}

impl Message {
    /// Build a publish message stamped with the current time.
    pub fn publish(data: Value, tags: Vec<String>, dest: Option<String>) -> Self {
        let context = if tags.is_empty() {
            None
        } else {
            Some(MessageContext {
                tags: Some(tags),
                wait: None,
            })
        };

        Self {
            msg_type: MessageType::Publish,
            data,
            timestamp: now_rfc3339(),
            context,
            dest: dest.filter(|d| !d.is_empty()),
        }
    }

    /// Mark the message as expecting a synchronous response.
    pub fn with_wait(mut self) -> Self {
        self.context.get_or_insert_with(MessageContext::default).wait = Some(true);
        self
    }

    /// Build a heartbeat from already validated stats.
    pub fn heartbeat(stats: &HeartbeatStats) -> Self {
        Self {
            msg_type: MessageType::Heartbeat,
            data: serde_json::to_value(stats).unwrap_or(Value::Null),
            timestamp: now_rfc3339(),
            context: None,
            dest: None,
        }
    }

    pub fn tags(&self) -> &[String] {
        self.context
            .as_ref()
            .and_then(|c| c.tags.as_deref())
            .unwrap_or(&[])
    }
}

/// Resource figures reported with a heartbeat. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_free: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_free: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<i64>,
}

impl HeartbeatStats {
    /// Rejects any provided field that is negative.
    pub fn validate(&self) -> Result<(), ClientError> {
        let fields = [
            ("mem_free", self.mem_free),
            ("mem_total", self.mem_total),
            ("disk_free", self.disk_free),
            ("disk_size", self.disk_size),
        ];

        for (name, value) in fields {
            if let Some(v) = value {
                if v < 0 {
                    return Err(ClientError::validation(format!(
                        "{name} must not be negative (got {v})"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
