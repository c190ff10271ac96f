//! Telegram host
//!
//! Long-polls updates and hands every text message to the command
//! dispatcher. Group chats map to group scopes, private chats to the shared
//! direct scope. Reminders are sent back through the same bot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{ChatAction, Update},
};

use super::traits::{HostError, Notifier};
use crate::config::Config;
use crate::dispatcher::{parse_command_line, DispatchOutcome, Dispatcher as CommandDispatcher};
use crate::identity::{MessageContext, ReplyTarget};

/// Telegram message size limit, with some headroom
const MAX_MESSAGE_BYTES: usize = 4000;

/// Shared handler state
struct BotData {
    dispatcher: CommandDispatcher,
    config: Config,
}

/// Delivers reminders to Telegram chats
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, target: &ReplyTarget, text: &str) -> Result<(), HostError> {
        let chat_id = chat_id_for(target)?;
        send_long_message(&self.bot, chat_id, text)
            .await
            .map_err(|e| HostError::SendFailed(e.to_string()))
    }
}

/// Private chat ids equal the user id, so both variants map directly
fn chat_id_for(target: &ReplyTarget) -> Result<ChatId, HostError> {
    let raw = match target {
        ReplyTarget::Group { group_id } => group_id,
        ReplyTarget::Direct { user_id } => user_id,
    };
    raw.parse::<i64>()
        .map(ChatId)
        .map_err(|_| HostError::InvalidRecipient(raw.clone()))
}

pub async fn run_telegram_bot(config: Config) -> Result<()> {
    let token = std::env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;

    let bot = Bot::new(token);

    tracing::info!("Verifying bot token...");
    let me = match bot.get_me().await {
        Ok(me) => me,
        Err(e) => {
            tracing::error!("Failed to authenticate bot: {}", e);
            anyhow::bail!("Bot authentication failed: {}", e);
        }
    };
    tracing::info!(
        "Bot authenticated: @{} (ID: {})",
        me.username.as_deref().unwrap_or("unknown"),
        me.id
    );

    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!("Failed to delete webhook: {} (continuing anyway)", e);
    }

    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let dispatcher = CommandDispatcher::from_config(&config, notifier)?.with_display_prefix("/");
    if let Some(username) = me.username.as_deref() {
        dispatcher.flags().seed_bot_identifier(username)?;
    }

    let data = Arc::new(BotData { dispatcher, config });

    let handler = Update::filter_message().endpoint(message_handler);

    tracing::info!("Starting dispatcher with long polling...");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![data])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in message handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

async fn message_handler(bot: Bot, msg: Message, data: Arc<BotData>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let ctx = message_context(&msg, text, &data.config);

    tracing::debug!(
        "Message received: user={:?}, chat={}, group={}",
        ctx.user_id,
        msg.chat.id.0,
        ctx.is_group()
    );

    if parse_command_line(text, &data.config.command_name).is_some() {
        if let Err(e) = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await {
            tracing::debug!("Typing action for chat {} failed: {}", msg.chat.id, e);
        }
    }

    let reply = match data.dispatcher.dispatch(&ctx).await {
        DispatchOutcome::Ignored => return Ok(()),
        DispatchOutcome::ShowHelp => data.dispatcher.help_text(),
        DispatchOutcome::Reply(reply) => reply,
    };

    if let Err(e) = send_long_message(&bot, msg.chat.id, &reply).await {
        tracing::error!("Failed to send reply to {}: {}", msg.chat.id, e);
    }
    Ok(())
}

fn message_context(msg: &Message, text: &str, config: &Config) -> MessageContext {
    let user = msg.from.as_ref();
    let user_id = user.map(|u| u.id.0.to_string());
    let user_name = user.map(|u| u.username.clone().unwrap_or_else(|| u.full_name()));
    let permission = user_id
        .as_deref()
        .map(|id| config.permission_for(id))
        .unwrap_or(0);

    let group_id = (msg.chat.is_group() || msg.chat.is_supergroup())
        .then(|| msg.chat.id.0.to_string());

    MessageContext {
        user_id,
        user_name,
        group_id,
        permission_level: Some(permission),
        text: text.to_string(),
    }
}

/// Send text, splitting on char boundaries when it exceeds the size limit
async fn send_long_message(bot: &Bot, chat_id: ChatId, text: &str) -> ResponseResult<()> {
    if text.is_empty() {
        bot.send_message(chat_id, "(no response)").await?;
        return Ok(());
    }

    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = remaining
            .char_indices()
            .take_while(|(i, _)| *i < MAX_MESSAGE_BYTES)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(remaining.len());
        let (chunk, rest) = remaining.split_at(split_at);
        bot.send_message(chat_id, chunk).await?;
        remaining = rest;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_for_targets() {
        let group = ReplyTarget::Group { group_id: "-100123".into() };
        assert_eq!(chat_id_for(&group).unwrap(), ChatId(-100123));

        let direct = ReplyTarget::Direct { user_id: "42".into() };
        assert_eq!(chat_id_for(&direct).unwrap(), ChatId(42));
    }

    #[test]
    fn test_chat_id_rejects_non_numeric() {
        let target = ReplyTarget::Direct { user_id: "unknown".into() };
        assert!(matches!(chat_id_for(&target), Err(HostError::InvalidRecipient(_))));
    }
}
