//! Command dispatcher
//!
//! Entry point for every inbound message. Routes explicit commands to their
//! handlers, answers bot mentions when free chat is on, and turns every
//! failure into exactly one user-facing reply.

pub mod command;
pub mod messages;

use futures_util::FutureExt;
use regex::Regex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::{ChatBackend, ChatRequest, HttpBackend};
use crate::config::Config;
use crate::error::{DispatchError, ValidationError};
use crate::host::Notifier;
use crate::identity::{
    capture_reply_target, resolve_identity, resolve_scope, ConversationScope, Identity,
    MessageContext,
};
use crate::settings::{FeatureFlags, FileSettings, BOT_IDENTIFIER_KEY};
use crate::tasks::{TaskDescriptor, TaskManager, TokioTimer};

pub use command::{classify, parse_command_line, Command, FreeAction, Subcommand, TaskAction};

/// What the host should do with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Render the help text
    ShowHelp,
    /// Send this text back to the originating conversation
    Reply(String),
    /// Not addressed to us
    Ignored,
}

impl DispatchOutcome {
    pub fn reply_text(&self) -> Option<&str> {
        match self {
            Self::Reply(text) => Some(text),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    backend: Arc<dyn ChatBackend>,
    tasks: Arc<TaskManager>,
    flags: FeatureFlags,
    command_name: String,
    display_prefix: String,
    max_message_chars: usize,
    precheck_health: bool,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        tasks: Arc<TaskManager>,
        flags: FeatureFlags,
        config: &Config,
    ) -> Self {
        Self {
            backend,
            tasks,
            flags,
            command_name: config.command_name.to_lowercase(),
            display_prefix: ".".to_string(),
            max_message_chars: config.max_message_chars,
            precheck_health: config.precheck_health,
        }
    }

    /// Production wiring: HTTP backend, settings file, tokio timers
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let backend = HttpBackend::new(&config.backend)?;
        info!("AI backend: {}", backend.base_url());

        let settings = FileSettings::open(&config.settings_path)?;
        info!("Settings file: {}", settings.path().display());
        let flags = FeatureFlags::new(Box::new(settings));
        if let Some(identifier) = &config.bot_identifier {
            flags.seed_bot_identifier(identifier)?;
        }

        let tasks = Arc::new(TaskManager::new(
            Arc::new(TokioTimer),
            notifier,
            config.task_permission,
        ));
        info!("Task permission threshold: {}", config.task_permission);

        Ok(Self::new(Arc::new(backend), tasks, flags, config))
    }

    /// Prefix shown in help and hints (`.` by default, `/` on Telegram)
    pub fn with_display_prefix(mut self, prefix: &str) -> Self {
        self.display_prefix = prefix.to_string();
        self
    }

    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// Command as the user types it, e.g. `.chat`
    pub fn command_display(&self) -> String {
        format!("{}{}", self.display_prefix, self.command_name)
    }

    pub fn help_text(&self) -> String {
        messages::help_text(&self.command_display())
    }

    /// Handle one inbound message
    pub async fn dispatch(&self, ctx: &MessageContext) -> DispatchOutcome {
        if let Some(args) = parse_command_line(&ctx.text, &self.command_name) {
            debug!("Command from {:?}: {:?}", ctx.user_id, args);
            return self.guarded(self.handle_command(ctx, args)).await;
        }

        if let Some(text) = self.mention_text(&ctx.text) {
            debug!("Mention from {:?} in free chat mode", ctx.user_id);
            return self.guarded(self.chat(ctx, &text)).await;
        }

        DispatchOutcome::Ignored
    }

    /// Route the arguments of an explicit command
    pub async fn handle_command(
        &self,
        ctx: &MessageContext,
        args: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        match classify(args) {
            Command::Help => Ok(DispatchOutcome::ShowHelp),
            Command::Test => Ok(self.handle_test().await),
            Command::Clear => Ok(self.handle_clear(ctx).await),
            Command::List => Ok(self.handle_list().await),
            Command::Free(action) => self.handle_free(action),
            Command::Task(action) => self.handle_task(ctx, action),
            Command::Chat(text) => self.chat(ctx, text).await,
        }
    }

    /// Last line of defence: errors become replies, panics become a retry hint
    async fn guarded<F>(&self, fut: F) -> DispatchOutcome
    where
        F: Future<Output = Result<DispatchOutcome, DispatchError>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                match &err {
                    DispatchError::Internal(e) => error!("Command failed: {:#}", e),
                    other => debug!("Command rejected: {}", other),
                }
                DispatchOutcome::Reply(messages::error_reply(&err, &self.command_display()))
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Handler panicked: {}", reason);
                DispatchOutcome::Reply(messages::COMMAND_FAILED.to_string())
            }
        }
    }

    /// Message text with mention markers stripped, when free chat should answer it
    fn mention_text(&self, text: &str) -> Option<String> {
        if !self.flags.free_chat_enabled() {
            return None;
        }
        let identifier = self.flags.bot_identifier()?;
        strip_mentions(&identifier, text)
    }

    async fn handle_test(&self) -> DispatchOutcome {
        let reply = match self.backend.health().await {
            Ok(health) => {
                info!("Health check: {}", health.status);
                messages::health_report(&health)
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                messages::health_failure(&e)
            }
        };
        DispatchOutcome::Reply(reply)
    }

    async fn handle_clear(&self, ctx: &MessageContext) -> DispatchOutcome {
        let scope = resolve_scope(ctx);
        let reply = match self.backend.clear_history(&scope.scope_id).await {
            Ok(r) if r.success => {
                info!("Cleared history for {}", scope);
                messages::clear_success(&scope)
            }
            Ok(r) => messages::clear_failure(&r.message, &self.command_display()),
            Err(e) => {
                warn!("Clear history for {} failed: {}", scope, e);
                messages::clear_failure(&messages::backend_message(&e), &self.command_display())
            }
        };
        DispatchOutcome::Reply(reply)
    }

    async fn handle_list(&self) -> DispatchOutcome {
        let reply = match self.backend.list_conversations().await {
            Ok(conversations) => messages::conversation_list(&conversations),
            Err(e) => {
                warn!("Listing conversations failed: {}", e);
                messages::list_failure(&messages::backend_message(&e), &self.command_display())
            }
        };
        DispatchOutcome::Reply(reply)
    }

    fn handle_free(&self, action: Option<FreeAction>) -> Result<DispatchOutcome, DispatchError> {
        let reply = match action {
            None => messages::free_usage(&self.command_display()),
            Some(FreeAction::Status) => messages::free_status(
                self.flags.free_chat_enabled(),
                self.flags.bot_identifier().as_deref(),
            ),
            Some(FreeAction::On) => {
                let identifier = self
                    .flags
                    .bot_identifier()
                    .ok_or(DispatchError::ConfigMissing(BOT_IDENTIFIER_KEY))?;
                self.flags.set_free_chat(true)?;
                info!("Free chat enabled for @{}", identifier);
                messages::free_enabled(&identifier)
            }
            Some(FreeAction::Off) => {
                self.flags.set_free_chat(false)?;
                info!("Free chat disabled");
                messages::FREE_DISABLED.to_string()
            }
        };
        Ok(DispatchOutcome::Reply(reply))
    }

    fn handle_task(
        &self,
        ctx: &MessageContext,
        action: TaskAction,
    ) -> Result<DispatchOutcome, DispatchError> {
        let identity = resolve_identity(ctx);
        let reply = match action {
            TaskAction::List => {
                let jobs = self.tasks.list_for(&identity, &resolve_scope(ctx));
                messages::task_list(&jobs)
            }
            TaskAction::Clear => {
                let report = self.tasks.clear(&identity)?;
                messages::task_cleared(report.removed, report.still_armed())
            }
            TaskAction::Help => {
                messages::task_help(&self.command_display(), self.tasks.permission_threshold())
            }
        };
        Ok(DispatchOutcome::Reply(reply))
    }

    /// Chat pipeline: validate, call the backend, attach any task
    async fn chat(&self, ctx: &MessageContext, text: &str) -> Result<DispatchOutcome, DispatchError> {
        let message = validate_message(text, self.max_message_chars)?;
        let identity = resolve_identity(ctx);
        let scope = resolve_scope(ctx);
        let cmd = self.command_display();

        if self.precheck_health {
            match self.backend.health().await {
                Ok(health) if health.is_healthy() => {}
                Ok(health) => {
                    warn!("Skipping chat, backend reports {}", health.status);
                    return Ok(DispatchOutcome::Reply(messages::service_unavailable(&cmd)));
                }
                Err(e) => {
                    warn!("Skipping chat, health check failed: {}", e);
                    return Ok(DispatchOutcome::Reply(messages::service_unavailable(&cmd)));
                }
            }
        }

        let request = ChatRequest::new(&identity, &scope, message);
        let reply = match self.backend.chat(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat for {} in {} failed: {}", identity.user_id, scope, e);
                return Ok(DispatchOutcome::Reply(messages::chat_failure(&e, &cmd)));
            }
        };

        let text = match (reply.success, reply.text()) {
            (true, Some(text)) => text,
            _ => {
                return Ok(DispatchOutcome::Reply(messages::chat_rejected(
                    reply.error.as_deref(),
                    &cmd,
                )))
            }
        };

        let mut out = text.to_string();
        if let Some(descriptor) = reply.task_descriptor() {
            out.push_str(&self.attach_task(descriptor, &identity, &scope, ctx));
        }
        Ok(DispatchOutcome::Reply(out))
    }

    /// Register a backend-proposed task and describe the outcome.
    /// Never fails the surrounding chat reply.
    fn attach_task(
        &self,
        descriptor: Result<TaskDescriptor, serde_json::Error>,
        identity: &Identity,
        scope: &ConversationScope,
        ctx: &MessageContext,
    ) -> String {
        let threshold = self.tasks.permission_threshold();
        if identity.permission_level < threshold {
            info!(
                "Ignoring task for {} (permission {} < {})",
                identity.user_id, identity.permission_level, threshold
            );
            return messages::task_permission_note(threshold);
        }

        let descriptor = match descriptor {
            Ok(d) => d,
            Err(e) => {
                let err = ValidationError::MalformedDescriptor(e.to_string());
                warn!("Task for {} not scheduled: {}", identity.user_id, err);
                return messages::TASK_FAILED.to_string();
            }
        };

        match self
            .tasks
            .register(descriptor, identity, scope, capture_reply_target(ctx))
        {
            Ok(job) => messages::task_confirmation(&job),
            Err(e) => {
                warn!("Task registration for {} failed: {}", identity.user_id, e);
                messages::TASK_FAILED.to_string()
            }
        }
    }
}

/// Trimmed message, or why it cannot be sent
pub fn validate_message(text: &str, max_chars: usize) -> Result<&str, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(ValidationError::MessageTooLong { len, max: max_chars });
    }
    Ok(text)
}

/// `@<id>` or `[CQ:at,qq=<id>]`, case-insensitive
fn mention_pattern(identifier: &str) -> Option<Regex> {
    let id = regex::escape(identifier);
    match Regex::new(&format!(r"(?i)\[CQ:at,qq={id}\]|@{id}")) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Cannot build mention pattern for {:?}: {}", identifier, e);
            None
        }
    }
}

/// Text with every mention of `identifier` removed, or `None` if it is not
/// mentioned. `@bot` only counts when no word character follows, so
/// `@botany` is someone else.
fn strip_mentions(identifier: &str, text: &str) -> Option<String> {
    let pattern = mention_pattern(identifier)?;

    let mut stripped = String::with_capacity(text.len());
    let mut last = 0;
    let mut found = false;
    for m in pattern.find_iter(text) {
        let bounded = m.as_str().starts_with('[')
            || text[m.end()..]
                .chars()
                .next()
                .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        if !bounded {
            continue;
        }
        stripped.push_str(&text[last..m.start()]);
        last = m.end();
        found = true;
    }
    if !found {
        return None;
    }
    stripped.push_str(&text[last..]);
    Some(stripped.trim().to_string())
}
