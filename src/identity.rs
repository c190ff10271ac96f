//! Identity Resolver
//!
//! Derives who sent a message and which conversation it belongs to.
//! Every accessor degrades to a default; nothing here can fail or mutate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel used when the host exposes neither an id nor a name
pub const UNKNOWN_USER: &str = "unknown";

/// Scope id shared by all direct conversations
pub const PRIVATE_SCOPE: &str = "private";

/// Inbound message as handed over by a host adapter
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    /// Host account id of the sender
    pub user_id: Option<String>,

    /// Display name of the sender
    pub user_name: Option<String>,

    /// Group identifier, `None` for direct chats
    pub group_id: Option<String>,

    /// Host permission level, `None` if the host has no such notion
    pub permission_level: Option<u32>,

    /// Raw message text
    pub text: String,
}

impl MessageContext {
    /// Direct message from a user
    pub fn direct(user_id: &str, user_name: &str, text: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            user_name: Some(user_name.to_string()),
            group_id: None,
            permission_level: None,
            text: text.to_string(),
        }
    }

    /// Message posted in a group
    pub fn in_group(mut self, group_id: &str) -> Self {
        self.group_id = Some(group_id.to_string());
        self
    }

    pub fn with_permission(mut self, level: u32) -> Self {
        self.permission_level = Some(level);
        self
    }

    pub fn is_group(&self) -> bool {
        non_empty(&self.group_id).is_some()
    }
}

/// Who sent a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub permission_level: u32,
}

/// Conversation isolation boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationScope {
    pub scope_id: String,
}

impl ConversationScope {
    pub fn private() -> Self {
        Self {
            scope_id: PRIVATE_SCOPE.to_string(),
        }
    }

    pub fn group(group_id: &str) -> Self {
        Self {
            scope_id: format!("group_{}", group_id),
        }
    }

    /// Human label: `private` → "direct", `group_<id>` → "group <id>"
    pub fn label(scope_id: &str) -> String {
        match scope_id.strip_prefix("group_") {
            Some(id) => format!("group {}", id),
            None if scope_id == PRIVATE_SCOPE => "direct".to_string(),
            None => scope_id.to_string(),
        }
    }
}

impl fmt::Display for ConversationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scope_id)
    }
}

/// Where a later notification has to be delivered.
///
/// Captured by value when a job is registered and owned by that job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyTarget {
    Group { group_id: String },
    Direct { user_id: String },
}

impl fmt::Display for ReplyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group { group_id } => write!(f, "group {}", group_id),
            Self::Direct { user_id } => write!(f, "direct {}", user_id),
        }
    }
}

/// Resolve the sender identity: id → name → "unknown"
pub fn resolve_identity(ctx: &MessageContext) -> Identity {
    let user_id = non_empty(&ctx.user_id)
        .or_else(|| non_empty(&ctx.user_name))
        .unwrap_or(UNKNOWN_USER)
        .to_string();

    let display_name = non_empty(&ctx.user_name)
        .map(str::to_string)
        .unwrap_or_else(|| user_id.clone());

    Identity {
        user_id,
        display_name,
        permission_level: ctx.permission_level.unwrap_or(0),
    }
}

/// Resolve the conversation scope
pub fn resolve_scope(ctx: &MessageContext) -> ConversationScope {
    match non_empty(&ctx.group_id) {
        Some(group_id) => ConversationScope::group(group_id),
        None => ConversationScope::private(),
    }
}

/// Snapshot the reply destination of a message
pub fn capture_reply_target(ctx: &MessageContext) -> ReplyTarget {
    match non_empty(&ctx.group_id) {
        Some(group_id) => ReplyTarget::Group {
            group_id: group_id.to_string(),
        },
        None => ReplyTarget::Direct {
            user_id: resolve_identity(ctx).user_id,
        },
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
