//! Transport adapter for the question-answering backend.
//!
//! Exposes the three remote operations (submit a question, read the index
//! status, health check) behind the [`RagBackend`] trait. Implementations
//! never return errors: transport failures are logged and folded into the
//! reply values.

pub mod client;
pub mod error;
pub mod mock;
pub mod reply;
mod wire;

pub use client::{RagBackend, RemoteRagClient};
pub use error::TransportError;
pub use mock::MockBackend;
pub use reply::{HealthReply, HealthStatus, QuestionReply, StatusReply};
