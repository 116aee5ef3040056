//! HTTP implementation of the backend operations.

use std::time::Duration;

use async_trait::async_trait;
use ragchat_core::config::BackendConfig;
use ragchat_core::error::RagChatError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{TransportError, UNREACHABLE_MESSAGE};
use crate::reply::{HealthReply, HealthStatus, QuestionReply, StatusReply};
use crate::wire::{
    self, HealthResponse, QuestionBody, QuestionResponse, StatusResponse, HEALTH_PATH,
    QUESTION_PATH, STATUS_PATH,
};

/// The three remote operations the chat core depends on.
///
/// Implementations must not fail: every transport problem is reported
/// through the reply value (`success == false` or `HealthStatus::Error`).
#[async_trait]
pub trait RagBackend: Send + Sync {
    /// Ask a question, requesting `result_count` source passages.
    async fn submit_question(&self, question: &str, result_count: u32) -> QuestionReply;

    /// Read the index status (number of indexed chunks).
    async fn get_status(&self) -> StatusReply;

    /// Probe backend liveness.
    async fn health_check(&self) -> HealthReply;
}

/// JSON-over-HTTP client for the question-answering backend.
#[derive(Clone, Debug)]
pub struct RemoteRagClient {
    http: Client,
    base_url: String,
}

impl RemoteRagClient {
    /// Client with no request timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(Client::new(), base_url)
    }

    /// Reuse a preconfigured `reqwest` client.
    pub fn with_http_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Build a client from the `[backend]` config section.
    pub fn from_config(config: &BackendConfig) -> Result<Self, RagChatError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| RagChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(http, config.base_url.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_question(
        &self,
        question: &str,
        result_count: u32,
    ) -> Result<QuestionResponse, TransportError> {
        let endpoint = self.endpoint(QUESTION_PATH);
        let body = QuestionBody {
            question,
            result_count,
        };
        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&endpoint, e))?;
        decode(&endpoint, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let endpoint = self.endpoint(path);
        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&endpoint, e))?;
        decode(&endpoint, response).await
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message: wire::error_message(&body),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| TransportError::from_reqwest(endpoint, e))
}

#[async_trait]
impl RagBackend for RemoteRagClient {
    async fn submit_question(&self, question: &str, result_count: u32) -> QuestionReply {
        match self.post_question(question, result_count).await {
            Ok(resp) => {
                let reply = QuestionReply::from(resp);
                debug!(
                    success = reply.success,
                    sources = reply.sources.len(),
                    "Question answered"
                );
                reply
            }
            Err(e) => {
                warn!(
                    error = %e,
                    status = ?e.status_code(),
                    "Question submission failed"
                );
                QuestionReply::failure(e.diagnostic())
            }
        }
    }

    async fn get_status(&self) -> StatusReply {
        match self.get_json::<StatusResponse>(STATUS_PATH).await {
            Ok(resp) => StatusReply::from(resp),
            Err(e) => {
                warn!(error = %e, status = ?e.status_code(), "Status check failed");
                StatusReply::failure(e.diagnostic())
            }
        }
    }

    async fn health_check(&self) -> HealthReply {
        match self.get_json::<HealthResponse>(HEALTH_PATH).await {
            Ok(resp) => HealthReply::from(resp),
            Err(e) => {
                warn!(error = %e, "Health check failed");
                HealthReply {
                    status: HealthStatus::Error,
                    message: Some(UNREACHABLE_MESSAGE.to_string()),
                }
            }
        }
    }
}
