use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Lifecycle of a message's content.
///
/// Only assistant placeholders start as `Thinking`; they move to `Complete`
/// or `Failed` exactly once, when the answer is reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    #[default]
    Complete,
    /// Placeholder awaiting the backend answer.
    Thinking,
    /// The question could not be answered; content holds the error text.
    Failed,
}

// =============================================================================
// Messages and conversations
// =============================================================================

/// A single message in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Source documents cited by an assistant answer.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Context passages the answer was generated from.
    #[serde(default)]
    pub contexts: Vec<String>,
    #[serde(default)]
    pub state: MessageState,
}

impl Message {
    /// A completed message written by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            sources: Vec::new(),
            contexts: Vec::new(),
            state: MessageState::Complete,
        }
    }

    /// An assistant placeholder shown while the answer is in flight.
    pub fn placeholder(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            sources: Vec::new(),
            contexts: Vec::new(),
            state: MessageState::Thinking,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.state == MessageState::Thinking
    }
}

/// A conversation and its ordered message history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation with a provisional title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Look up a message by id.
    pub fn message(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Whether any user message has been appended yet.
    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }
}

// =============================================================================
// Index status
// =============================================================================

/// Cached view of the backend's document index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Number of indexed chunks; 0 when the status call failed.
    pub chunk_count: u64,
    pub success: bool,
    pub message: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Whether this snapshot is older than `max_age`.
    pub fn is_older_than(&self, max_age: chrono::Duration) -> bool {
        Utc::now() - self.fetched_at > max_age
    }
}
