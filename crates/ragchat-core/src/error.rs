use thiserror::Error;

/// Top-level error type for the rag-chat workspace.
///
/// Subsystem crates define their own error types (`TransportError`,
/// `ChatError`) and convert into this one where a caller needs a single
/// error surface, for example when bootstrapping from a config file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RagChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for RagChatError {
    fn from(err: toml::de::Error) -> Self {
        RagChatError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RagChatError {
    fn from(err: toml::ser::Error) -> Self {
        RagChatError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RagChatError {
    fn from(err: serde_json::Error) -> Self {
        RagChatError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for rag-chat operations.
pub type Result<T> = std::result::Result<T, RagChatError>;
