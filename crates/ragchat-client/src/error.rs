//! Error types for the backend transport.

use ragchat_core::error::RagChatError;

/// Fallback diagnostic when nothing more specific is known.
pub const UNREACHABLE_MESSAGE: &str = "unable to reach the server";

/// Failures talking to the backend.
///
/// These never leave the client: [`crate::RemoteRagClient`] logs them and
/// converts them into a failed reply.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("network error on {endpoint}: {message}")]
    Network { endpoint: String, message: String },
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: String,
        status: u16,
        /// `message` field of the backend's JSON error body, if any.
        message: Option<String>,
    },
    #[error("invalid response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl TransportError {
    pub(crate) fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        let endpoint = endpoint.to_string();
        if err.is_timeout() {
            TransportError::Timeout { endpoint }
        } else if err.is_decode() {
            TransportError::Decode {
                endpoint,
                message: err.to_string(),
            }
        } else {
            TransportError::Network {
                endpoint,
                message: err.to_string(),
            }
        }
    }

    /// HTTP status code for non-2xx responses.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Best-effort message for the user-facing reply.
    ///
    /// Prefers the backend's own message, then the transport error text.
    pub fn diagnostic(&self) -> String {
        match self {
            TransportError::Status {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            other => {
                let text = other.to_string();
                if text.is_empty() {
                    UNREACHABLE_MESSAGE.to_string()
                } else {
                    text
                }
            }
        }
    }
}

impl From<TransportError> for RagChatError {
    fn from(err: TransportError) -> Self {
        RagChatError::Transport(err.to_string())
    }
}
