pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::RagChatConfig;
pub use error::{RagChatError, Result};
pub use types::*;
