pub mod envelope;

use crate::models::{CreatePoll, Poll, UpdatePoll};
use async_trait::async_trait;
use envelope::{decode_active_poll, decode_mutation};
use log::{error, info};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

pub use envelope::MutationOutcome;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{operation} failed with status {status}")]
    Status { operation: &'static str, status: u16 },
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}

/// Admin API for polls.
#[async_trait]
pub trait PollApi: Send + Sync {
    /// `Ok(None)` means the backend has no active poll.
    async fn active_poll(&self) -> Result<Option<Poll>, ApiError>;
    async fn create_poll(&self, poll: &CreatePoll) -> Result<MutationOutcome, ApiError>;
    async fn update_poll(&self, poll_id: &str, changes: &UpdatePoll) -> Result<MutationOutcome, ApiError>;
    async fn close_poll(&self, poll_id: &str) -> Result<MutationOutcome, ApiError>;
    async fn delete_poll(&self, poll_id: &str) -> Result<MutationOutcome, ApiError>;
}

pub struct HttpPollApi {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpPollApi {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        method: Method,
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.base_url, operation);
        let mut request = self
            .client
            .request(method, &url)
            .header("x-api-key", &self.api_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            error!("{} returned status {}", operation, status);
            return Err(ApiError::Status {
                operation,
                status: status.as_u16(),
            });
        }

        // Some endpoints answer with an empty body
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let body: Value = serde_json::from_str(&text)?;
        info!("Server response ({}): {}", operation, body);
        Ok(body)
    }
}

#[async_trait]
impl PollApi for HttpPollApi {
    async fn active_poll(&self) -> Result<Option<Poll>, ApiError> {
        let body = self.send::<Value>("active-poll", Method::GET, None).await?;
        Ok(decode_active_poll(body))
    }

    async fn create_poll(&self, poll: &CreatePoll) -> Result<MutationOutcome, ApiError> {
        let body = self.send("create-poll", Method::POST, Some(poll)).await?;
        decode_mutation(body, "Failed to create poll")
    }

    async fn update_poll(&self, poll_id: &str, changes: &UpdatePoll) -> Result<MutationOutcome, ApiError> {
        let mut request = serde_json::to_value(changes)?;
        if let Value::Object(fields) = &mut request {
            fields.insert("pollId".to_string(), Value::String(poll_id.to_string()));
        }
        let body = self.send("update-poll", Method::PUT, Some(&request)).await?;
        decode_mutation(body, "Failed to update poll")
    }

    async fn close_poll(&self, poll_id: &str) -> Result<MutationOutcome, ApiError> {
        let request = json!({ "pollId": poll_id });
        let body = self.send("close-poll", Method::POST, Some(&request)).await?;
        decode_mutation(body, "Failed to close poll")
    }

    async fn delete_poll(&self, poll_id: &str) -> Result<MutationOutcome, ApiError> {
        let request = json!({ "pollId": poll_id });
        let body = self.send("delete-poll", Method::DELETE, Some(&request)).await?;
        decode_mutation(body, "Failed to delete poll")
    }
}
