//! Chat orchestrator.
//!
//! Coordinates one user turn: validate, append the user message and an
//! assistant placeholder, drive a [`QuestionRequestController`], reconcile
//! the placeholder with the outcome, and invalidate the cached index status
//! on success. Locks are never held across a network await.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ragchat_client::{HealthReply, QuestionReply, RagBackend, RemoteRagClient};
use ragchat_core::config::RagChatConfig;
use ragchat_core::error::RagChatError;
use ragchat_core::types::{Conversation, Message, StatusSnapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ChatError;
use crate::request::{
    validate_question, QuestionRequestController, RetryPolicy, ROBUST_RETRY_DELAY,
};
use crate::status::StatusPoller;
use crate::store::{ConversationStore, ReconcileOutcome};

/// Retries after a failed health check before the backend is reported down.
pub const HEALTH_MAX_RETRIES: u32 = 3;

/// How a submitted question ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Answered { attempt: u32 },
    Failed { error: ChatError },
}

/// One completed user turn.
#[derive(Clone, Debug, PartialEq)]
pub struct Exchange {
    pub conversation_id: Uuid,
    pub question: Message,
    /// The reconciled assistant message.
    pub answer: Message,
    pub outcome: ExchangeOutcome,
}

impl Exchange {
    pub fn is_answered(&self) -> bool {
        matches!(self.outcome, ExchangeOutcome::Answered { .. })
    }
}

/// Entry point for the chat core.
pub struct ChatOrchestrator {
    backend: Arc<dyn RagBackend>,
    store: Mutex<ConversationStore>,
    status: StatusPoller,
    policy: RetryPolicy,
    health_policy: RetryPolicy,
    default_result_count: u32,
    poll_interval: Option<Duration>,
    /// Conversations with a question in flight.
    pending: Mutex<HashSet<Uuid>>,
    pending_tx: watch::Sender<bool>,
}

impl ChatOrchestrator {
    pub fn new(backend: Arc<dyn RagBackend>, config: &RagChatConfig) -> Self {
        let (pending_tx, _) = watch::channel(false);
        Self {
            status: StatusPoller::from_config(backend.clone(), &config.status),
            backend,
            store: Mutex::new(ConversationStore::new(config.chat.clone())),
            policy: RetryPolicy::from_config(&config.request),
            health_policy: RetryPolicy::Robust {
                max_retries: HEALTH_MAX_RETRIES,
                delay: ROBUST_RETRY_DELAY,
            },
            default_result_count: config.request.default_result_count,
            poll_interval: config
                .status
                .poll_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            pending: Mutex::new(HashSet::new()),
            pending_tx,
        }
    }

    /// Build an orchestrator talking HTTP to the configured backend.
    pub fn from_config(config: &RagChatConfig) -> Result<Self, RagChatError> {
        let client = RemoteRagClient::from_config(&config.backend)?;
        info!(base_url = %client.base_url(), "Chat orchestrator initialized");
        Ok(Self::new(Arc::new(client), config))
    }

    /// Override the retry policy taken from config.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Override how failed health checks are retried.
    pub fn with_health_policy(mut self, policy: RetryPolicy) -> Self {
        self.health_policy = policy;
        self
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Ask a question in the active conversation with the default result count.
    pub async fn submit(&self, text: &str) -> Result<Exchange, ChatError> {
        let conversation_id = self.lock_store().active_id();
        self.submit_to(conversation_id, text, None).await
    }

    /// Ask a question in a specific conversation.
    ///
    /// Validation failures, an unknown conversation and a question already in
    /// flight for that conversation are returned as errors before anything
    /// is mutated or sent. Backend failures are not errors: they come back as
    /// an [`Exchange`] whose placeholder holds the error text.
    pub async fn submit_to(
        &self,
        conversation_id: Uuid,
        text: &str,
        result_count: Option<u32>,
    ) -> Result<Exchange, ChatError> {
        let result_count = result_count.unwrap_or(self.default_result_count);
        validate_question(text, result_count)?;
        let _slot = self.claim(conversation_id)?;

        let (question, placeholder) = {
            let mut store = self.lock_store();
            let question = store.append_user_message(conversation_id, text)?;
            let placeholder = store.append_placeholder(conversation_id)?;
            (question, placeholder)
        };

        let status = self.status.clone();
        let controller = QuestionRequestController::new(self.backend.clone(), self.policy)
            .on_success(Arc::new(move |_: &QuestionReply| status.invalidate()));

        let (outcome, reconcile) = match controller.submit(&question.content, result_count).await {
            Ok(answered) => (
                ExchangeOutcome::Answered {
                    attempt: answered.attempt,
                },
                ReconcileOutcome::Answered {
                    content: answered.reply.answer,
                    sources: answered.reply.sources,
                    contexts: answered.reply.contexts,
                },
            ),
            Err(error) => {
                warn!(%conversation_id, error = %error, "Question not answered");
                (ExchangeOutcome::Failed { error }, ReconcileOutcome::Failed)
            }
        };

        let answer = self
            .lock_store()
            .reconcile_placeholder(conversation_id, placeholder.id, reconcile)?;

        Ok(Exchange {
            conversation_id,
            question,
            answer,
            outcome,
        })
    }

    /// Whether any conversation has a question in flight.
    pub fn is_pending(&self) -> bool {
        !self.lock_pending().is_empty()
    }

    pub fn is_pending_in(&self, conversation_id: Uuid) -> bool {
        self.lock_pending().contains(&conversation_id)
    }

    /// Observe the aggregate pending flag.
    pub fn subscribe_pending(&self) -> watch::Receiver<bool> {
        self.pending_tx.subscribe()
    }

    // =========================================================================
    // Status & health
    // =========================================================================

    /// Cached index status; never waits on the network.
    pub fn status(&self) -> Option<StatusSnapshot> {
        self.status.read()
    }

    pub fn status_poller(&self) -> &StatusPoller {
        &self.status
    }

    /// Start background status polling if an interval is configured.
    pub fn start_status_polling(&self) -> Option<JoinHandle<()>> {
        self.poll_interval
            .map(|every| self.status.spawn_polling(every))
    }

    /// Probe the backend, retrying failures per the health policy.
    ///
    /// Returns the first healthy reply, or the last failure once retries
    /// are exhausted.
    pub async fn health(&self) -> HealthReply {
        let max_retries = self.health_policy.max_retries();
        let mut attempt = 0;
        loop {
            let reply = self.backend.health_check().await;
            if reply.is_ok() {
                return reply;
            }
            if attempt >= max_retries {
                warn!(attempts = attempt + 1, message = ?reply.message, "Backend unhealthy");
                return reply;
            }
            attempt += 1;
            debug!(attempt, max_retries, "Health check failed, retrying");
            tokio::time::sleep(self.health_policy.delay()).await;
        }
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Create a conversation and make it active.
    pub fn new_conversation(&self) -> Conversation {
        self.lock_store().create_conversation()
    }

    pub fn select_conversation(&self, id: Uuid) -> Result<(), ChatError> {
        self.lock_store().select_conversation(id)
    }

    /// Delete a conversation. Refused while it has a question in flight.
    pub fn delete_conversation(&self, id: Uuid) -> Result<(), ChatError> {
        // Pending before store, same order as `claim` then append.
        let pending = self.lock_pending();
        if pending.contains(&id) {
            return Err(ChatError::RequestInFlight);
        }
        self.lock_store().delete_conversation(id)
    }

    pub fn active_id(&self) -> Uuid {
        self.lock_store().active_id()
    }

    pub fn active_conversation(&self) -> Conversation {
        self.lock_store().active().clone()
    }

    pub fn conversation(&self, id: Uuid) -> Option<Conversation> {
        self.lock_store().conversation(id).cloned()
    }

    /// Snapshot of all conversations, newest first.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.lock_store().conversations().to_vec()
    }

    // -- Private helpers --

    fn lock_store(&self) -> MutexGuard<'_, ConversationStore> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn claim(&self, conversation_id: Uuid) -> Result<PendingSlot<'_>, ChatError> {
        let mut pending = self.lock_pending();
        if !pending.insert(conversation_id) {
            return Err(ChatError::RequestInFlight);
        }
        self.pending_tx.send_replace(true);
        Ok(PendingSlot {
            orchestrator: self,
            conversation_id,
        })
    }
}

/// Releases a conversation's pending slot when the submission ends.
struct PendingSlot<'a> {
    orchestrator: &'a ChatOrchestrator,
    conversation_id: Uuid,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        let mut pending = self.orchestrator.lock_pending();
        pending.remove(&self.conversation_id);
        self.orchestrator.pending_tx.send_replace(!pending.is_empty());
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_client::{HealthStatus, MockBackend};
    use ragchat_core::config::ChatConfig;
    use ragchat_core::types::{MessageState, Role};

    fn orchestrator(backend: &Arc<MockBackend>) -> ChatOrchestrator {
        ChatOrchestrator::new(backend.clone(), &RagChatConfig::default())
    }

    fn fast_robust() -> RetryPolicy {
        RetryPolicy::Robust {
            max_retries: 2,
            delay: Duration::from_millis(10),
        }
    }

    fn fast_health() -> RetryPolicy {
        RetryPolicy::Robust {
            max_retries: HEALTH_MAX_RETRIES,
            delay: Duration::from_millis(5),
        }
    }

    async fn wait_for_status_calls(backend: &MockBackend, expected: usize) {
        for _ in 0..100 {
            if backend.status_calls() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {expected} status calls, saw {}", backend.status_calls());
    }

    // ---- Validation ----

    #[tokio::test]
    async fn test_blank_input_changes_nothing() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);
        let before = chat.active_conversation();

        let err = chat.submit("  \n\t ").await.unwrap_err();
        assert_eq!(err, ChatError::EmptyInput);
        assert_eq!(backend.question_calls(), 0);
        assert_eq!(chat.active_conversation(), before);
        assert!(!chat.is_pending());
    }

    #[tokio::test]
    async fn test_zero_result_count_changes_nothing() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);
        let id = chat.active_id();

        let err = chat.submit_to(id, "question", Some(0)).await.unwrap_err();
        assert_eq!(err, ChatError::InvalidResultCount(0));
        assert!(chat.active_conversation().messages.is_empty());
        assert_eq!(backend.question_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_conversation_rejected() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);
        let missing = Uuid::new_v4();

        let err = chat.submit_to(missing, "question", None).await.unwrap_err();
        assert_eq!(err, ChatError::ConversationNotFound(missing));
        assert_eq!(backend.question_calls(), 0);
        assert!(!chat.is_pending());
    }

    // ---- Answers ----

    #[tokio::test]
    async fn test_passport_question_round_trip() {
        let backend = Arc::new(MockBackend::answering(
            "Rendez-vous en mairie.",
            &["doc1"],
        ));
        let chat = orchestrator(&backend);
        let id = chat.active_id();

        let exchange = chat
            .submit_to(id, "Comment obtenir un passeport ?", Some(5))
            .await
            .unwrap();

        assert!(exchange.is_answered());
        assert_eq!(exchange.outcome, ExchangeOutcome::Answered { attempt: 0 });
        assert_eq!(exchange.question.role, Role::User);
        assert_eq!(exchange.answer.role, Role::Assistant);
        assert_eq!(exchange.answer.content, "Rendez-vous en mairie.");
        assert_eq!(exchange.answer.sources, vec!["doc1"]);
        assert_eq!(exchange.answer.state, MessageState::Complete);
        assert_eq!(
            backend.questions(),
            vec![("Comment obtenir un passeport ?".to_string(), 5)]
        );

        let conversation = chat.active_conversation();
        assert_eq!(conversation.title, "Comment obtenir un passeport ?");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1], exchange.answer);
    }

    #[tokio::test]
    async fn test_default_result_count_from_config() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);

        chat.submit("Bonjour ?").await.unwrap();
        assert_eq!(backend.questions(), vec![("Bonjour ?".to_string(), 3)]);
    }

    #[tokio::test]
    async fn test_failure_shows_error_text() {
        let backend = Arc::new(MockBackend::failing("Erreur de connexion au serveur"));
        let chat = orchestrator(&backend);

        let exchange = chat.submit("Bonjour ?").await.unwrap();
        assert!(!exchange.is_answered());
        match &exchange.outcome {
            ExchangeOutcome::Failed { error } => assert_eq!(error.attempt(), Some(0)),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(exchange.answer.content, ChatConfig::default().error_text);
        assert!(exchange.answer.sources.is_empty());
        assert_eq!(exchange.answer.state, MessageState::Failed);
        assert!(!chat.is_pending());
    }

    #[tokio::test]
    async fn test_conversation_usable_after_failure() {
        let backend = Arc::new(MockBackend::answering("second time", &[]));
        backend.fail_next(1, "down");
        let chat = orchestrator(&backend);

        assert!(!chat.submit("first").await.unwrap().is_answered());
        let exchange = chat.submit("second").await.unwrap();
        assert!(exchange.is_answered());
        assert_eq!(chat.active_conversation().messages.len(), 4);
        // Title comes from the first user message even though it failed
        assert_eq!(chat.active_conversation().title, "first");
    }

    #[tokio::test]
    async fn test_robust_policy_retries_before_answering() {
        let backend = Arc::new(MockBackend::answering("ok", &[]));
        backend.fail_next(2, "flaky");
        let chat = orchestrator(&backend).with_policy(fast_robust());

        let exchange = chat.submit("question").await.unwrap();
        assert_eq!(exchange.outcome, ExchangeOutcome::Answered { attempt: 2 });
        assert_eq!(backend.question_calls(), 3);
        // Retries never duplicate messages
        assert_eq!(chat.active_conversation().messages.len(), 2);
    }

    // ---- Status ----

    #[tokio::test]
    async fn test_success_invalidates_status() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);
        chat.status_poller().refresh().await;
        assert!(!chat.status_poller().is_stale());

        chat.submit("question").await.unwrap();
        assert!(chat.status_poller().is_stale());

        assert!(chat.status().is_some());
        wait_for_status_calls(&backend, 2).await;
    }

    #[tokio::test]
    async fn test_failure_keeps_status_fresh() {
        let backend = Arc::new(MockBackend::failing("down"));
        let chat = orchestrator(&backend);
        chat.status_poller().refresh().await;

        chat.submit("question").await.unwrap();
        assert!(!chat.status_poller().is_stale());
        assert!(chat.status().is_some());
        tokio::task::yield_now().await;
        assert_eq!(backend.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_polling_disabled_by_default() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);
        assert!(chat.start_status_polling().is_none());
    }

    #[tokio::test]
    async fn test_health_passthrough() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);
        assert_eq!(chat.health().await.status, HealthStatus::Ok);
        assert_eq!(backend.health_calls(), 1);
    }

    #[tokio::test]
    async fn test_health_retries_transient_failures() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_health_next(2, "Erreur de connexion au serveur");
        let chat = orchestrator(&backend).with_health_policy(fast_health());

        let health = chat.health().await;
        assert_eq!(health.status, HealthStatus::Ok);
        assert_eq!(backend.health_calls(), 3);
    }

    #[tokio::test]
    async fn test_health_reports_error_after_retries() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_health_next(10, "down");
        let chat = orchestrator(&backend).with_health_policy(fast_health());

        let health = chat.health().await;
        assert_eq!(health.status, HealthStatus::Error);
        assert_eq!(health.message.as_deref(), Some("down"));
        assert_eq!(backend.health_calls(), 1 + HEALTH_MAX_RETRIES as usize);
    }

    #[test]
    fn test_default_health_policy() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);
        assert_eq!(chat.health_policy.max_retries(), 3);
        assert_eq!(chat.health_policy.delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_poll_interval_disables_polling() {
        let backend = Arc::new(MockBackend::new());
        let mut config = RagChatConfig::default();
        config.status.poll_interval_secs = Some(0);
        let chat = ChatOrchestrator::new(backend.clone(), &config);

        assert!(chat.start_status_polling().is_none());
        tokio::task::yield_now().await;
        assert_eq!(backend.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_configured_poll_interval_starts_polling() {
        let backend = Arc::new(MockBackend::new());
        backend.set_chunk_count(9);
        let mut config = RagChatConfig::default();
        config.status.poll_interval_secs = Some(60);
        let chat = ChatOrchestrator::new(backend.clone(), &config);
        let mut updates = chat.status_poller().subscribe();

        let handle = chat.start_status_polling().unwrap();
        tokio::time::timeout(Duration::from_secs(2), updates.changed())
            .await
            .unwrap()
            .unwrap();
        handle.abort();

        assert_eq!(chat.status_poller().snapshot().unwrap().chunk_count, 9);
    }

    // ---- Concurrency ----

    #[tokio::test]
    async fn test_pending_blocks_same_conversation_only() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_millis(150)));
        let chat = Arc::new(orchestrator(&backend));
        let first_id = chat.active_id();
        let mut pending_rx = chat.subscribe_pending();

        let first = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.submit_to(first_id, "first", None).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(chat.is_pending());
        assert!(chat.is_pending_in(first_id));
        assert!(*pending_rx.borrow_and_update());

        let err = chat.submit_to(first_id, "again", None).await.unwrap_err();
        assert_eq!(err, ChatError::RequestInFlight);
        assert_eq!(chat.conversation(first_id).unwrap().messages.len(), 2);
        assert_eq!(
            chat.delete_conversation(first_id),
            Err(ChatError::RequestInFlight)
        );

        let other = chat.new_conversation();
        let exchange = chat.submit_to(other.id, "other", None).await.unwrap();
        assert!(exchange.is_answered());

        assert!(first.await.unwrap().unwrap().is_answered());
        assert!(!chat.is_pending());
        assert!(!*pending_rx.borrow_and_update());
        assert_eq!(backend.question_calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_delete_racing_submit_never_loses_an_answer() {
        let backend = Arc::new(MockBackend::new());
        let chat = Arc::new(orchestrator(&backend));

        let mut answered = 0;
        for _ in 0..200 {
            let target = chat.new_conversation().id;
            let submit = {
                let chat = chat.clone();
                tokio::spawn(async move { chat.submit_to(target, "question", None).await })
            };
            let delete = {
                let chat = chat.clone();
                tokio::spawn(async move { chat.delete_conversation(target) })
            };

            match submit.await.unwrap() {
                Ok(exchange) => {
                    assert!(exchange.is_answered());
                    answered += 1;
                }
                // Deleted before the question was appended
                Err(err) => assert_eq!(err, ChatError::ConversationNotFound(target)),
            }
            match delete.await.unwrap() {
                Ok(()) | Err(ChatError::RequestInFlight) => {}
                Err(other) => panic!("unexpected delete error {other:?}"),
            }
        }

        // Every question that reached the backend was reconciled
        assert_eq!(backend.question_calls(), answered);
        assert!(!chat.is_pending());
    }

    #[tokio::test]
    async fn test_switching_conversation_mid_flight() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_millis(100)));
        let chat = Arc::new(orchestrator(&backend));
        let first_id = chat.active_id();

        let first = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.submit("first").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let other = chat.new_conversation();
        assert_eq!(chat.active_id(), other.id);

        let exchange = first.await.unwrap().unwrap();
        assert_eq!(exchange.conversation_id, first_id);
        assert!(chat.conversation(other.id).unwrap().messages.is_empty());
        assert_eq!(chat.conversation(first_id).unwrap().messages.len(), 2);
    }

    // ---- Conversations ----

    #[tokio::test]
    async fn test_conversation_management() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);
        let first = chat.active_id();

        let second = chat.new_conversation();
        assert_eq!(second.title, ChatConfig::default().new_conversation_title);
        assert_eq!(chat.conversations()[0].id, second.id);

        chat.select_conversation(first).unwrap();
        assert_eq!(chat.active_id(), first);

        chat.delete_conversation(first).unwrap();
        assert_eq!(chat.active_id(), second.id);
        assert_eq!(chat.conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_long_question_title_truncated() {
        let backend = Arc::new(MockBackend::new());
        let chat = orchestrator(&backend);
        let question = "é".repeat(80);

        chat.submit(&question).await.unwrap();
        assert_eq!(chat.active_conversation().title.chars().count(), 50);
    }
}
