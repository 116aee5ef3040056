//! Conversation orchestration for the question-answering assistant.
//!
//! Owns the conversation list, drives each question through a retrying
//! request controller, reconciles assistant placeholders in place, and keeps
//! a cached view of the backend's index status.

pub mod error;
pub mod orchestrator;
pub mod request;
pub mod status;
pub mod store;

pub use error::ChatError;
pub use orchestrator::{ChatOrchestrator, Exchange, ExchangeOutcome, HEALTH_MAX_RETRIES};
pub use request::{
    validate_transition, Answered, QuestionRequest, QuestionRequestController, RequestState,
    RetryPolicy,
};
pub use status::StatusPoller;
pub use store::{ConversationStore, ReconcileOutcome};
