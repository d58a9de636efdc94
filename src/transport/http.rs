//! HTTP transport backed by `reqwest`.
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /messages` single message, answers `{"id": ...}`
//! - `POST /messages/batch` `{"messages": [...]}`
//! - `GET /messages?limit=N` 204 or empty body when nothing is pending
//! - `PUT /presence` `{"online": bool}`
//! - `GET /health` reachability probe

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use super::Transport;
use super::message::{BatchRequest, PresenceRequest, SendResponse};
use crate::config::EndpointSettings;
use crate::message::{CheckMessage, Message, MessageId};
use crate::utils::TransportError;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_settings(endpoint: &EndpointSettings) -> Self {
        Self::new(&endpoint.base_url, endpoint.api_key.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder, timeout: Duration) -> RequestBuilder {
        let request = request.timeout(timeout);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn execute(request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

/// Decode a poll body. A blank body counts as "no content".
pub(crate) fn parse_poll_body(body: &str) -> Result<Vec<CheckMessage>, TransportError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_one(
        &self,
        message: &Message,
        timeout: Duration,
    ) -> Result<MessageId, TransportError> {
        let request = self.authorize(self.client.post(self.url("messages")), timeout);
        let response = Self::execute(request.json(message)).await?;
        let body: SendResponse = response.json().await?;
        debug!(id = %body.id, "Message accepted");
        Ok(body.id)
    }

    async fn send_batch(
        &self,
        messages: &[Message],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let request = self.authorize(self.client.post(self.url("messages/batch")), timeout);
        Self::execute(request.json(&BatchRequest { messages })).await?;
        debug!(count = messages.len(), "Batch accepted");
        Ok(())
    }

    async fn poll(
        &self,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<CheckMessage>, TransportError> {
        let request = self
            .authorize(self.client.get(self.url("messages")), timeout)
            .query(&[("limit", limit)]);
        let response = Self::execute(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let body = response.text().await?;
        parse_poll_body(&body)
    }

    async fn set_presence(&self, online: bool, timeout: Duration) -> Result<(), TransportError> {
        let request = self.authorize(self.client.put(self.url("presence")), timeout);
        Self::execute(request.json(&PresenceRequest { online })).await?;
        Ok(())
    }

    async fn probe(&self, timeout: Duration) -> Result<(), TransportError> {
        let request = self.authorize(self.client.get(self.url("health")), timeout);
        Self::execute(request).await?;
        Ok(())
    }
}
