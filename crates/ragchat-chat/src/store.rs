//! Conversation store.
//!
//! Owns every conversation and its message list, tracks the active
//! conversation, and implements the two-phase append/reconcile protocol
//! for assistant answers: a placeholder is appended before the question is
//! sent and later rewritten in place, addressed by its id.

use chrono::Utc;
use ragchat_core::config::ChatConfig;
use ragchat_core::types::{Conversation, Message, MessageState};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::ChatError;

/// Result applied to a placeholder when its question completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Answered {
        content: String,
        sources: Vec<String>,
        contexts: Vec<String>,
    },
    /// Replaced by the configured error text; sources are cleared.
    Failed,
}

// =============================================================================
// ConversationStore
// =============================================================================

/// In-memory set of conversations, newest first.
///
/// Always holds at least one conversation, and the active id always refers
/// to one of them.
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_id: Uuid,
    config: ChatConfig,
}

impl ConversationStore {
    /// Create a store holding one empty, active conversation.
    pub fn new(config: ChatConfig) -> Self {
        let first = Conversation::new(config.new_conversation_title.clone());
        let active_id = first.id;
        Self {
            conversations: vec![first],
            active_id,
            config,
        }
    }

    /// Create a new conversation at the top of the list and make it active.
    pub fn create_conversation(&mut self) -> Conversation {
        let conversation = Conversation::new(self.config.new_conversation_title.clone());
        self.active_id = conversation.id;
        self.conversations.insert(0, conversation.clone());
        info!(conversation_id = %conversation.id, "Conversation created");
        conversation
    }

    /// Make `id` the active conversation.
    pub fn select_conversation(&mut self, id: Uuid) -> Result<(), ChatError> {
        if self.conversation(id).is_none() {
            return Err(ChatError::ConversationNotFound(id));
        }
        self.active_id = id;
        debug!(conversation_id = %id, "Conversation selected");
        Ok(())
    }

    /// Remove a conversation.
    ///
    /// If it was active, the newest remaining conversation becomes active;
    /// deleting the last conversation replaces it with a fresh empty one.
    pub fn delete_conversation(&mut self, id: Uuid) -> Result<(), ChatError> {
        let index = self
            .position(id)
            .ok_or(ChatError::ConversationNotFound(id))?;
        self.conversations.remove(index);
        info!(conversation_id = %id, "Conversation deleted");

        if self.conversations.is_empty() {
            self.create_conversation();
        } else if self.active_id == id {
            self.active_id = self.conversations[0].id;
        }
        Ok(())
    }

    pub fn active_id(&self) -> Uuid {
        self.active_id
    }

    /// The active conversation.
    pub fn active(&self) -> &Conversation {
        self.conversation(self.active_id)
            .unwrap_or(&self.conversations[0])
    }

    /// All conversations, newest first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Append a user message, deriving the title from the first one.
    pub fn append_user_message(
        &mut self,
        conversation_id: Uuid,
        text: &str,
    ) -> Result<Message, ChatError> {
        let title_max_chars = self.config.title_max_chars;
        let conversation = self.conversation_mut(conversation_id)?;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyInput);
        }

        if !conversation.has_user_message() {
            conversation.title = derive_title(trimmed, title_max_chars);
        }

        let message = Message::user(trimmed);
        conversation.messages.push(message.clone());
        debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            "User message appended"
        );
        Ok(message)
    }

    /// Append an assistant placeholder awaiting reconciliation.
    pub fn append_placeholder(&mut self, conversation_id: Uuid) -> Result<Message, ChatError> {
        let message = Message::placeholder(self.config.placeholder_text.clone());
        let conversation = self.conversation_mut(conversation_id)?;
        conversation.messages.push(message.clone());
        debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            "Placeholder appended"
        );
        Ok(message)
    }

    /// Rewrite a placeholder in place with the outcome of its question.
    ///
    /// Each placeholder is reconciled exactly once: a second call, or a call
    /// naming a message that is not a placeholder, fails with
    /// [`ChatError::AlreadyReconciled`].
    pub fn reconcile_placeholder(
        &mut self,
        conversation_id: Uuid,
        placeholder_id: Uuid,
        outcome: ReconcileOutcome,
    ) -> Result<Message, ChatError> {
        let error_text = self.config.error_text.clone();
        let conversation = self.conversation_mut(conversation_id)?;

        let Some(message) = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == placeholder_id)
        else {
            error!(
                conversation_id = %conversation_id,
                message_id = %placeholder_id,
                "Placeholder missing at reconciliation"
            );
            return Err(ChatError::MessageNotFound {
                conversation_id,
                message_id: placeholder_id,
            });
        };

        if !message.is_placeholder() {
            error!(message_id = %placeholder_id, "Placeholder reconciled twice");
            return Err(ChatError::AlreadyReconciled(placeholder_id));
        }

        match outcome {
            ReconcileOutcome::Answered {
                content,
                sources,
                contexts,
            } => {
                message.content = content;
                message.sources = sources;
                message.contexts = contexts;
                message.state = MessageState::Complete;
            }
            ReconcileOutcome::Failed => {
                message.content = error_text;
                message.sources.clear();
                message.contexts.clear();
                message.state = MessageState::Failed;
            }
        }
        message.timestamp = Utc::now();

        debug!(
            conversation_id = %conversation_id,
            message_id = %placeholder_id,
            state = ?message.state,
            "Placeholder reconciled"
        );
        Ok(message.clone())
    }

    // -- Private helpers --

    fn position(&self, id: Uuid) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == id)
    }

    fn conversation_mut(&mut self, id: Uuid) -> Result<&mut Conversation, ChatError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(ChatError::ConversationNotFound(id))
    }
}

/// First `max_chars` characters of the trimmed text.
fn derive_title(trimmed: &str, max_chars: usize) -> String {
    trimmed.chars().take(max_chars).collect()
}

// =============================================================================
// Tests
// =============================================================================
