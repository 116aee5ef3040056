//! In-memory backend for tests and offline development.
//!
//! `MockBackend` answers from a script of queued replies, falling back to a
//! default reply once the script is drained, and counts every call so tests
//! can assert how often the network would have been hit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::RagBackend;
use crate::reply::{HealthReply, HealthStatus, QuestionReply, StatusReply};

/// Scripted [`RagBackend`] with call counters.
pub struct MockBackend {
    scripted: Mutex<VecDeque<QuestionReply>>,
    fallback: Mutex<QuestionReply>,
    status: Mutex<StatusReply>,
    health: Mutex<HealthReply>,
    scripted_health: Mutex<VecDeque<HealthReply>>,
    latency: Option<Duration>,
    questions: Mutex<Vec<(String, u32)>>,
    question_calls: AtomicUsize,
    status_calls: AtomicUsize,
    health_calls: AtomicUsize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Backend answering every question successfully with no sources.
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(QuestionReply::answered("mock answer", Vec::new())),
            status: Mutex::new(StatusReply {
                success: true,
                chunk_count: 0,
                message: None,
            }),
            health: Mutex::new(HealthReply {
                status: HealthStatus::Ok,
                message: None,
            }),
            scripted_health: Mutex::new(VecDeque::new()),
            latency: None,
            questions: Mutex::new(Vec::new()),
            question_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
        }
    }

    /// Backend answering every question with `answer` citing `sources`.
    pub fn answering(answer: &str, sources: &[&str]) -> Self {
        let backend = Self::new();
        backend.set_fallback(QuestionReply::answered(
            answer,
            sources.iter().map(|s| s.to_string()).collect(),
        ));
        backend
    }

    /// Backend whose every question fails with `message`.
    pub fn failing(message: &str) -> Self {
        let backend = Self::new();
        backend.set_fallback(QuestionReply::failure(message));
        backend
    }

    /// Delay every call by `latency` before replying.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a reply for the next unanswered question.
    pub fn push_reply(&self, reply: QuestionReply) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.push_back(reply);
        }
    }

    /// Queue `count` failures ahead of the fallback reply.
    pub fn fail_next(&self, count: usize, message: &str) {
        for _ in 0..count {
            self.push_reply(QuestionReply::failure(message));
        }
    }

    /// Reply used once the script is drained.
    pub fn set_fallback(&self, reply: QuestionReply) {
        if let Ok(mut fallback) = self.fallback.lock() {
            *fallback = reply;
        }
    }

    pub fn set_status(&self, reply: StatusReply) {
        if let Ok(mut status) = self.status.lock() {
            *status = reply;
        }
    }

    /// Shortcut for a successful status with `chunk_count` chunks.
    pub fn set_chunk_count(&self, chunk_count: u64) {
        self.set_status(StatusReply {
            success: true,
            chunk_count,
            message: None,
        });
    }

    pub fn set_health(&self, reply: HealthReply) {
        if let Ok(mut health) = self.health.lock() {
            *health = reply;
        }
    }

    /// Queue `count` failed health checks ahead of the steady health reply.
    pub fn fail_health_next(&self, count: usize, message: &str) {
        if let Ok(mut scripted) = self.scripted_health.lock() {
            for _ in 0..count {
                scripted.push_back(HealthReply {
                    status: HealthStatus::Error,
                    message: Some(message.to_string()),
                });
            }
        }
    }

    pub fn question_calls(&self) -> usize {
        self.question_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Every `(question, result_count)` pair received, in call order.
    pub fn questions(&self) -> Vec<(String, u32)> {
        self.questions
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RagBackend for MockBackend {
    async fn submit_question(&self, question: &str, result_count: u32) -> QuestionReply {
        self.question_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut questions) = self.questions.lock() {
            questions.push((question.to_string(), result_count));
        }
        self.simulate_latency().await;

        let scripted = self.scripted.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(reply) => reply,
            None => self
                .fallback
                .lock()
                .map(|f| f.clone())
                .unwrap_or_else(|_| QuestionReply::failure("mock backend poisoned")),
        }
    }

    async fn get_status(&self) -> StatusReply {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| StatusReply::failure("mock backend poisoned"))
    }

    async fn health_check(&self) -> HealthReply {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if let Some(reply) = self.scripted_health.lock().ok().and_then(|mut s| s.pop_front()) {
            return reply;
        }
        self.health.lock().map(|h| h.clone()).unwrap_or(HealthReply {
            status: HealthStatus::Error,
            message: Some("mock backend poisoned".to_string()),
        })
    }
}
