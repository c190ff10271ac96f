//! ChatBridge
//!
//! Bridges chat hosts to an external conversational AI backend.
//!
//! # Features
//!
//! - **Commands**: `.chat <message>` plus help/test/clear/list/free/task subcommands
//! - **Free Chat**: answer messages that mention the bot, toggled at runtime
//! - **Scoped History**: one conversation per group, one shared direct scope
//! - **Deferred Tasks**: backend-proposed reminders (cron, interval, daily)
//! - **Resilient Client**: bounded retries with linear backoff on transport errors
//!
//! # Architecture
//!
//! ```text
//! Telegram / Console ──► Dispatcher ──► ChatBackend (HTTP) ──► AI service
//!                            │
//!                            ├── Identity (user, scope, reply target)
//!                            ├── FeatureFlags (settings file)
//!                            └── TaskManager ──► TimerHost ──► Notifier
//! ```

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod identity;
pub mod settings;
pub mod tasks;

pub use backend::{ChatBackend, HttpBackend, RetryPolicy};
pub use config::Config;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{BackendError, DispatchError, ValidationError};
pub use host::{HostError, Notifier};
pub use identity::{ConversationScope, Identity, MessageContext, ReplyTarget};
pub use settings::{FeatureFlags, FileSettings, MemorySettings, SettingsStore};
pub use tasks::{TaskDescriptor, TaskKind, TaskManager, TimerHost, TokioTimer};
