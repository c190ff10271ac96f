//! Chat host adapters
//!
//! A host turns platform messages into [`MessageContext`](crate::identity::MessageContext)
//! values for the dispatcher and delivers replies and reminders back.

pub mod console;
pub mod telegram;
pub mod traits;

pub use console::{run_console, ConsoleNotifier};
pub use telegram::{run_telegram_bot, TelegramNotifier};
pub use traits::{HostError, Notifier};
