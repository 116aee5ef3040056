//! Normalized results of the three backend operations.

use serde::{Deserialize, Serialize};

use crate::error::UNREACHABLE_MESSAGE;

/// Outcome of a submitted question.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionReply {
    pub success: bool,
    pub answer: String,
    pub sources: Vec<String>,
    pub contexts: Vec<String>,
    pub message: Option<String>,
}

impl QuestionReply {
    /// A successful answer citing `sources`.
    pub fn answered(answer: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            success: true,
            answer: answer.into(),
            sources,
            contexts: Vec::new(),
            message: None,
        }
    }

    /// A failed reply carrying a diagnostic.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            answer: String::new(),
            sources: Vec::new(),
            contexts: Vec::new(),
            message: Some(message.into()),
        }
    }

    /// Diagnostic to surface when the reply is a failure.
    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| UNREACHABLE_MESSAGE.to_string())
    }
}

/// Outcome of an index status read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub success: bool,
    pub chunk_count: u64,
    pub message: Option<String>,
}

impl StatusReply {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            chunk_count: 0,
            message: Some(message.into()),
        }
    }
}

/// Coarse backend health.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Error,
}

impl HealthStatus {
    /// Anything other than `"ok"` (case-insensitive) counts as an error.
    pub fn from_wire(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("ok") {
            HealthStatus::Ok
        } else {
            HealthStatus::Error
        }
    }
}

/// Outcome of a health check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: HealthStatus,
    pub message: Option<String>,
}

impl HealthReply {
    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reply_shape() {
        let reply = QuestionReply::failure("timeout");
        assert!(!reply.success);
        assert!(reply.answer.is_empty());
        assert!(reply.sources.is_empty());
        assert_eq!(reply.failure_message(), "timeout");
    }

    #[test]
    fn test_failure_message_fallback() {
        let reply = QuestionReply {
            success: false,
            ..QuestionReply::default()
        };
        assert_eq!(reply.failure_message(), UNREACHABLE_MESSAGE);
    }

    #[test]
    fn test_health_status_from_wire() {
        assert_eq!(HealthStatus::from_wire("ok"), HealthStatus::Ok);
        assert_eq!(HealthStatus::from_wire(" OK "), HealthStatus::Ok);
        assert_eq!(HealthStatus::from_wire("degraded"), HealthStatus::Error);
        assert_eq!(HealthStatus::from_wire(""), HealthStatus::Error);
    }

    #[test]
    fn test_status_failure_defaults_chunk_count() {
        let reply = StatusReply::failure("down");
        assert_eq!(reply.chunk_count, 0);
        assert!(!reply.success);
    }
}
