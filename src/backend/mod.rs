//! AI Backend Client
//!
//! Request/response calls against the AI reply service:
//! - `GET /health` - precondition gate, never retried
//! - `POST /chat` - chat turn, may carry a task descriptor
//! - `POST /clear_history` - reset one conversation scope
//! - `GET /conversations` - message counts per scope

pub mod http;
pub mod retry;
pub mod types;

pub use http::HttpBackend;
pub use retry::RetryPolicy;
pub use types::{ChatReply, ChatRequest, ClearHistoryReply, HealthStatus};

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::BackendError;

/// Operations the dispatcher needs from the AI service
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn health(&self) -> Result<HealthStatus, BackendError>;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError>;

    async fn clear_history(&self, scope_id: &str) -> Result<ClearHistoryReply, BackendError>;

    /// scope id → message count
    async fn list_conversations(&self) -> Result<BTreeMap<String, u64>, BackendError>;
}
