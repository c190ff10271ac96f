//! ChatBridge - Entry Point
//!
//! Modes:
//! - Default / --console / -c: read messages from stdin
//! - --telegram / -t: Telegram bot mode

use chatbridge::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let telegram_mode = args.iter().any(|a| a == "--telegram" || a == "-t");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("ChatBridge v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: chatbridge [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --telegram, -t     Run as Telegram bot");
        println!("  --console, -c      Read messages from stdin (default)");
        println!("  --help, -h         Show this help");
        println!();
        println!("Environment variables:");
        println!("  CHATBRIDGE_BACKEND_URL         AI backend (default: http://localhost:1478)");
        println!("  CHATBRIDGE_TIMEOUT_MS          Request timeout (default: 30000)");
        println!("  CHATBRIDGE_MAX_RETRIES         Attempts per request (default: 3)");
        println!("  CHATBRIDGE_RETRY_DELAY_MS      Backoff base (default: 1000)");
        println!("  CHATBRIDGE_TASK_PERMISSION     Task permission threshold (default: 60)");
        println!("  CHATBRIDGE_MAX_MESSAGE_CHARS   Message cap (default: 2000)");
        println!("  CHATBRIDGE_COMMAND             Command word (default: chat)");
        println!("  CHATBRIDGE_PRECHECK_HEALTH     Health check before each chat (default: false)");
        println!("  CHATBRIDGE_SETTINGS_PATH       Feature flag file");
        println!("  CHATBRIDGE_BOT_IDENTIFIER      Mention trigger for free chat");
        println!("  CHATBRIDGE_ADMIN_USERS         Comma separated ids with permission 100");
        println!("  CHATBRIDGE_TRUSTED_USERS       Comma separated ids allowed to create tasks");
        println!("  CHATBRIDGE_CONSOLE_PERMISSION  Console user permission (default: 100)");
        println!("  CHATBRIDGE_CONSOLE_GROUP       Group id for the console user");
        println!("  TELEGRAM_BOT_TOKEN             Telegram bot token");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if telegram_mode {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // Console mode - stdout carries replies, logs go to stderr
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;

    if telegram_mode {
        info!("ChatBridge Telegram Bot v{}", env!("CARGO_PKG_VERSION"));
        chatbridge::host::run_telegram_bot(config).await?;
    } else {
        info!("ChatBridge Console v{}", env!("CARGO_PKG_VERSION"));
        chatbridge::host::run_console(config).await?;
    }

    Ok(())
}
