//! Error types for conversation and request orchestration.

use ragchat_core::error::RagChatError;
use uuid::Uuid;

use crate::request::RequestState;

/// Errors from the chat core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyInput,
    #[error("result count must be at least 1, got {0}")]
    InvalidResultCount(u32),
    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),
    #[error("message {message_id} not found in conversation {conversation_id}")]
    MessageNotFound {
        conversation_id: Uuid,
        message_id: Uuid,
    },
    #[error("message {0} is not an unreconciled placeholder")]
    AlreadyReconciled(Uuid),
    #[error("a question is already in flight")]
    RequestInFlight,
    #[error("invalid request transition: {0} -> {1}")]
    InvalidTransition(RequestState, RequestState),
    #[error("question failed: {message}")]
    RequestFailed { attempt: u32, message: String },
    #[error("question failed after {attempts} retries: {message}")]
    RetryExhausted { attempts: u32, message: String },
}

impl ChatError {
    /// Input rejected before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyInput | ChatError::InvalidResultCount(_)
        )
    }

    /// Caller or state-machine bug: an unknown id or an out-of-order call.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            ChatError::ConversationNotFound(_)
                | ChatError::MessageNotFound { .. }
                | ChatError::AlreadyReconciled(_)
                | ChatError::RequestInFlight
                | ChatError::InvalidTransition(..)
        )
    }

    /// Terminal failure of a submitted question.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            ChatError::RequestFailed { .. } | ChatError::RetryExhausted { .. }
        )
    }

    /// Retry attempt reached when a question failed terminally.
    pub fn attempt(&self) -> Option<u32> {
        match self {
            ChatError::RequestFailed { attempt, .. } => Some(*attempt),
            ChatError::RetryExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

impl From<ChatError> for RagChatError {
    fn from(err: ChatError) -> Self {
        RagChatError::Chat(err.to_string())
    }
}
