//! JSON payloads exchanged with the backend, field names as sent on the wire.

use serde::{Deserialize, Serialize};

use crate::reply::{HealthReply, HealthStatus, QuestionReply, StatusReply};

pub(crate) const QUESTION_PATH: &str = "question/";
pub(crate) const STATUS_PATH: &str = "statut/";
pub(crate) const HEALTH_PATH: &str = "health/";

/// `POST /question/` body.
#[derive(Debug, Serialize)]
pub(crate) struct QuestionBody<'a> {
    pub question: &'a str,
    #[serde(rename = "n_resultats")]
    pub result_count: u32,
}

/// `POST /question/` response.
#[derive(Debug, Deserialize)]
pub(crate) struct QuestionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "reponse")]
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, rename = "contextes")]
    pub contexts: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<QuestionResponse> for QuestionReply {
    fn from(resp: QuestionResponse) -> Self {
        QuestionReply {
            success: resp.success,
            answer: resp.answer,
            sources: resp.sources,
            contexts: resp.contexts,
            message: resp.message,
        }
    }
}

/// `GET /statut/` response.
#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "nombre_chunks")]
    pub chunk_count: u64,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<StatusResponse> for StatusReply {
    fn from(resp: StatusResponse) -> Self {
        StatusReply {
            success: resp.success,
            chunk_count: resp.chunk_count,
            message: resp.message,
        }
    }
}

/// `GET /health/` response.
#[derive(Debug, Deserialize)]
pub(crate) struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<HealthResponse> for HealthReply {
    fn from(resp: HealthResponse) -> Self {
        HealthReply {
            status: HealthStatus::from_wire(&resp.status),
            message: resp.message,
        }
    }
}

/// Error body shape shared by every endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Pull the `message` field out of a non-2xx body, if it is JSON.
pub(crate) fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_body_field_names() {
        let body = QuestionBody {
            question: "Comment obtenir un passeport ?",
            result_count: 5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "question": "Comment obtenir un passeport ?",
                "n_resultats": 5
            })
        );
    }

    #[test]
    fn test_question_response_optional_fields() {
        let resp: QuestionResponse =
            serde_json::from_str(r#"{"success": true, "reponse": "Oui"}"#).unwrap();
        let reply: QuestionReply = resp.into();
        assert!(reply.success);
        assert_eq!(reply.answer, "Oui");
        assert!(reply.sources.is_empty());
        assert!(reply.contexts.is_empty());
        assert!(reply.message.is_none());
    }

    #[test]
    fn test_question_response_full() {
        let resp: QuestionResponse = serde_json::from_str(
            r#"{"success": true, "question": "q", "reponse": "r",
                "sources": ["doc1", "doc2"], "contextes": ["passage"]}"#,
        )
        .unwrap();
        let reply: QuestionReply = resp.into();
        assert_eq!(reply.sources, vec!["doc1", "doc2"]);
        assert_eq!(reply.contexts, vec!["passage"]);
    }

    #[test]
    fn test_status_response_mapping() {
        let resp: StatusResponse =
            serde_json::from_str(r#"{"success": true, "nombre_chunks": 1284}"#).unwrap();
        let reply: StatusReply = resp.into();
        assert!(reply.success);
        assert_eq!(reply.chunk_count, 1284);
    }

    #[test]
    fn test_health_response_mapping() {
        let resp: HealthResponse =
            serde_json::from_str(r#"{"status": "ok", "message": "up"}"#).unwrap();
        let reply: HealthReply = resp.into();
        assert!(reply.is_ok());
        assert_eq!(reply.message.as_deref(), Some("up"));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"success": false, "message": "Format JSON invalide"}"#),
            Some("Format JSON invalide".to_string())
        );
        assert_eq!(error_message("<html>502</html>"), None);
        assert_eq!(error_message(r#"{"success": false}"#), None);
    }
}
