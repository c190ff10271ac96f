//! Console host
//!
//! Reads one message per stdin line and prints replies to stdout. Handy for
//! poking at a backend without a chat platform. Each line is handled on its
//! own task so a slow backend call never blocks the next line.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use super::traits::{HostError, Notifier};
use crate::config::Config;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::identity::{MessageContext, ReplyTarget};

pub const CONSOLE_USER: &str = "console";

/// Prints reminders to stdout
#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, target: &ReplyTarget, text: &str) -> Result<(), HostError> {
        println!("[{}] {}", target, text);
        Ok(())
    }
}

fn console_context(config: &Config, user_name: &str, line: &str) -> MessageContext {
    let mut ctx = MessageContext::direct(CONSOLE_USER, user_name, line)
        .with_permission(config.console_permission);
    if let Some(group) = &config.console_group {
        ctx = ctx.in_group(group);
    }
    ctx
}

pub async fn run_console(config: Config) -> Result<()> {
    let dispatcher = Arc::new(Dispatcher::from_config(&config, Arc::new(ConsoleNotifier))?);
    let user_name = std::env::var("USER").unwrap_or_else(|_| CONSOLE_USER.to_string());

    info!(
        "Console ready as {:?} (permission {}), type {} help",
        user_name,
        config.console_permission,
        dispatcher.command_display()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let ctx = console_context(&config, &user_name, &line);
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            match dispatcher.dispatch(&ctx).await {
                DispatchOutcome::ShowHelp => println!("{}", dispatcher.help_text()),
                DispatchOutcome::Reply(reply) => println!("{}", reply),
                DispatchOutcome::Ignored => debug!("Ignored console line {:?}", ctx.text),
            }
        });
    }

    info!("Console input closed");
    Ok(())
}
