//! Question request controller with validated state transitions.
//!
//! One controller tracks one logical question at a time:
//! Idle -> Pending -> Success/Error
//! A terminal controller may be reused (Success/Error -> Pending). A pending
//! future that is dropped before completing returns the controller to Idle.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ragchat_client::{QuestionReply, RagBackend};
use ragchat_core::config::{RequestConfig, RetryPolicyName};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ChatError;

/// Retries allowed by [`RetryPolicy::robust`].
pub const ROBUST_MAX_RETRIES: u32 = 2;
/// Delay between attempts for [`RetryPolicy::robust`].
pub const ROBUST_RETRY_DELAY: Duration = Duration::from_secs(1);

// =============================================================================
// State machine
// =============================================================================

/// Lifecycle of a question request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Success | RequestState::Error)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Idle => "idle",
            RequestState::Pending => "pending",
            RequestState::Success => "success",
            RequestState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Validate that a request state transition is allowed.
///
/// Valid transitions:
/// - Idle -> Pending
/// - Success -> Pending, Error -> Pending (controller reuse)
/// - Pending -> Success
/// - Pending -> Error
/// - Pending -> Idle (in-flight future dropped)
///
/// Retries do not change state; they stay in Pending and bump the attempt.
pub fn validate_transition(from: RequestState, to: RequestState) -> Result<(), ChatError> {
    let valid = matches!(
        (from, to),
        (RequestState::Idle, RequestState::Pending)
            | (RequestState::Success, RequestState::Pending)
            | (RequestState::Error, RequestState::Pending)
            | (RequestState::Pending, RequestState::Success)
            | (RequestState::Pending, RequestState::Error)
            | (RequestState::Pending, RequestState::Idle)
    );

    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition(from, to))
    }
}

// =============================================================================
// Retry policy
// =============================================================================

/// How failed submissions are retried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// No automatic retry; the first failure is terminal.
    #[default]
    Default,
    /// Retry up to `max_retries` times, sleeping `delay` before each retry.
    Robust { max_retries: u32, delay: Duration },
}

impl RetryPolicy {
    /// Two retries, one second apart.
    pub fn robust() -> Self {
        RetryPolicy::Robust {
            max_retries: ROBUST_MAX_RETRIES,
            delay: ROBUST_RETRY_DELAY,
        }
    }

    /// Build the policy named in the `[request]` config section.
    pub fn from_config(config: &RequestConfig) -> Self {
        match config.retry_policy {
            RetryPolicyName::Default => RetryPolicy::Default,
            RetryPolicyName::Robust => RetryPolicy::Robust {
                max_retries: config.max_retries,
                delay: Duration::from_millis(config.retry_delay_ms),
            },
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::Default => 0,
            RetryPolicy::Robust { max_retries, .. } => *max_retries,
        }
    }

    pub fn delay(&self) -> Duration {
        match self {
            RetryPolicy::Default => Duration::ZERO,
            RetryPolicy::Robust { delay, .. } => *delay,
        }
    }
}

// =============================================================================
// QuestionRequest
// =============================================================================

/// Snapshot of the question a controller is working on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    pub result_count: u32,
    pub state: RequestState,
    /// Retries performed so far; 0 on the first attempt.
    pub attempt: u32,
}

/// Successful terminal result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Answered {
    pub reply: QuestionReply,
    /// Retry attempt on which the answer arrived.
    pub attempt: u32,
}

/// Reject blank questions and zero result counts before any network call.
pub fn validate_question(question: &str, result_count: u32) -> Result<(), ChatError> {
    if question.trim().is_empty() {
        return Err(ChatError::EmptyInput);
    }
    if result_count < 1 {
        return Err(ChatError::InvalidResultCount(result_count));
    }
    Ok(())
}

// =============================================================================
// QuestionRequestController
// =============================================================================

/// Callback fired after a successful answer. It must not block.
pub type SuccessCallback = Arc<dyn Fn(&QuestionReply) + Send + Sync>;

#[derive(Default)]
struct ControllerState {
    state: RequestState,
    request: Option<QuestionRequest>,
    /// Failed attempts during the latest submission.
    failure_count: u32,
}

/// Drives one question through submit, retry and terminal states.
pub struct QuestionRequestController {
    backend: Arc<dyn RagBackend>,
    policy: RetryPolicy,
    inner: Mutex<ControllerState>,
    on_success: Option<SuccessCallback>,
}

impl QuestionRequestController {
    pub fn new(backend: Arc<dyn RagBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            inner: Mutex::new(ControllerState::default()),
            on_success: None,
        }
    }

    /// Register a notification fired on every successful answer.
    pub fn on_success(mut self, callback: SuccessCallback) -> Self {
        self.on_success = Some(callback);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn state(&self) -> RequestState {
        self.lock().state
    }

    pub fn is_pending(&self) -> bool {
        self.state() == RequestState::Pending
    }

    /// Retry attempt of the latest submission.
    pub fn attempt(&self) -> u32 {
        self.lock().request.as_ref().map_or(0, |r| r.attempt)
    }

    /// Failed attempts during the latest submission.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// The latest submitted question, if any.
    pub fn current_request(&self) -> Option<QuestionRequest> {
        self.lock().request.clone()
    }

    /// Submit a question and drive it to a terminal state.
    ///
    /// Fails immediately with [`ChatError::RequestInFlight`] while another
    /// submission on this controller is pending. A terminal failure is
    /// [`ChatError::RequestFailed`] under the default policy and
    /// [`ChatError::RetryExhausted`] once retries run out.
    pub async fn submit(&self, question: &str, result_count: u32) -> Result<Answered, ChatError> {
        validate_question(question, result_count)?;
        let question = question.trim().to_string();
        self.begin(&question, result_count)?;
        let mut guard = PendingGuard {
            controller: self,
            settled: false,
        };

        let max_retries = self.policy.max_retries();
        let mut attempt = 0;
        loop {
            let reply = self.backend.submit_question(&question, result_count).await;

            if reply.success {
                self.settle(RequestState::Success);
                guard.settled = true;
                info!(attempt, sources = reply.sources.len(), "Question answered");
                if let Some(callback) = &self.on_success {
                    callback(&reply);
                }
                return Ok(Answered { reply, attempt });
            }

            let message = reply.failure_message();
            self.lock().failure_count += 1;

            if attempt < max_retries {
                attempt += 1;
                self.set_attempt(attempt);
                warn!(attempt, max_retries, error = %message, "Question failed, retrying");
                tokio::time::sleep(self.policy.delay()).await;
                continue;
            }

            self.settle(RequestState::Error);
            guard.settled = true;
            warn!(attempt, error = %message, "Question failed");
            return Err(if max_retries == 0 {
                ChatError::RequestFailed { attempt, message }
            } else {
                ChatError::RetryExhausted {
                    attempts: attempt,
                    message,
                }
            });
        }
    }

    // -- Private helpers --

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, question: &str, result_count: u32) -> Result<(), ChatError> {
        let mut inner = self.lock();
        if inner.state == RequestState::Pending {
            return Err(ChatError::RequestInFlight);
        }
        validate_transition(inner.state, RequestState::Pending)?;

        inner.state = RequestState::Pending;
        inner.failure_count = 0;
        inner.request = Some(QuestionRequest {
            question: question.to_string(),
            result_count,
            state: RequestState::Pending,
            attempt: 0,
        });
        debug!(result_count, "Request pending");
        Ok(())
    }

    fn set_attempt(&self, attempt: u32) {
        if let Some(request) = self.lock().request.as_mut() {
            request.attempt = attempt;
        }
    }

    fn settle(&self, to: RequestState) {
        let mut inner = self.lock();
        if let Err(e) = validate_transition(inner.state, to) {
            warn!(error = %e, "Ignoring request transition");
            return;
        }
        inner.state = to;
        if let Some(request) = inner.request.as_mut() {
            request.state = to;
        }
        debug!(state = %to, "Request settled");
    }
}

/// Returns the controller to Idle if a pending submission is dropped.
struct PendingGuard<'a> {
    controller: &'a QuestionRequestController,
    settled: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Pending request abandoned");
            self.controller.settle(RequestState::Idle);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
