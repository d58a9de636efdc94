use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw inbound record as returned by the transport's poll call.
///
/// Tags travel at the top level on the wire; [`IncomingMessage`] carries
/// them under `context` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckMessage {
    pub msg_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingContext {
    pub tags: Vec<String>,
}

/// Normalized inbound message handed to the registered handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub msg_type: String,
    pub data: Value,
    pub source: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<IncomingContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl From<CheckMessage> for IncomingMessage {
    fn from(raw: CheckMessage) -> Self {
        Self {
            msg_type: raw.msg_type,
            data: raw.data,
            source: raw.source,
            timestamp: raw.timestamp,
            context: raw.tags.map(|tags| IncomingContext { tags }),
            dest: raw.dest,
            request_id: raw.request_id,
        }
    }
}

impl IncomingMessage {
    pub fn tags(&self) -> &[String] {
        self.context.as_ref().map(|c| c.tags.as_slice()).unwrap_or(&[])
    }
}
