//! Host Trait Definitions
//!
//! The outbound side of a chat host, as seen by the task manager.

use async_trait::async_trait;

use crate::identity::ReplyTarget;

/// Error types for host delivery
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Delivers text to a previously captured reply target
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &ReplyTarget, text: &str) -> Result<(), HostError>;
}
