use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId};

/// Body of a batch send.
#[derive(Debug, Serialize)]
pub struct BatchRequest<'a> {
    pub messages: &'a [Message],
}

/// Response to a single send.
#[derive(Debug, Deserialize)]
pub struct SendResponse {
    pub id: MessageId,
}

/// Body of a presence update.
#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceRequest {
    pub online: bool,
}
