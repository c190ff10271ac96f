//! Wire types for the AI backend

use serde::{Deserialize, Serialize};

use crate::identity::{ConversationScope, Identity};
use crate::tasks::TaskDescriptor;

/// `POST /chat` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(rename = "user_name")]
    pub display_name: String,
    pub message: String,
    #[serde(rename = "conversation_id")]
    pub scope_id: String,
    #[serde(rename = "user_permission")]
    pub permission_level: u32,
}

impl ChatRequest {
    pub fn new(identity: &Identity, scope: &ConversationScope, message: &str) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
            message: message.to_string(),
            scope_id: scope.scope_id.clone(),
            permission_level: identity.permission_level,
        }
    }
}

/// `POST /chat` response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub success: bool,
    #[serde(default, rename = "reply")]
    pub reply_text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Kept raw so a bad descriptor only fails the task, not the reply
    #[serde(default)]
    pub task_info: Option<serde_json::Value>,
}

impl ChatReply {
    /// Non-empty reply text
    pub fn text(&self) -> Option<&str> {
        self.reply_text.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Decode the attached task descriptor, if any
    pub fn task_descriptor(&self) -> Option<Result<TaskDescriptor, serde_json::Error>> {
        match &self.task_info {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(serde_json::from_value(value.clone())),
        }
    }
}

/// `GET /health` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub api_configured: bool,
    #[serde(default)]
    pub warning: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// `POST /clear_history` body
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ClearHistoryRequest<'a> {
    pub conversation_id: &'a str,
}

/// `POST /clear_history` response
#[derive(Debug, Clone, Deserialize)]
pub struct ClearHistoryReply {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// `GET /conversations` response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConversationsReply {
    pub conversations: std::collections::BTreeMap<String, u64>,
}
