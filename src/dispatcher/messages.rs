//! User-facing reply texts

use std::collections::BTreeMap;

use crate::backend::HealthStatus;
use crate::error::{BackendError, DispatchError, ValidationError};
use crate::identity::{ConversationScope, PRIVATE_SCOPE};
use crate::tasks::ScheduledJob;

pub const COMMAND_FAILED: &str = "❌ Command failed, please retry.";

pub fn help_text(cmd: &str) -> String {
    format!(
        "AI chat\n\n\
        Usage:\n\
        {cmd} <message> - talk to the AI\n\
        {cmd} clear - clear this conversation's history\n\
        {cmd} list - list conversations known to the AI service\n\
        {cmd} test - check the AI service\n\
        {cmd} free [on|off|status] - answer messages that mention the bot\n\
        {cmd} task [list|clear|help] - scheduled reminders\n\
        {cmd} help - show this help\n\n\
        Examples:\n\
        {cmd} hello, introduce yourself\n\
        {cmd} remind me to drink water every hour"
    )
}

pub fn task_help(cmd: &str, threshold: u32) -> String {
    format!(
        "Scheduled reminders\n\n\
        Reminders are created by the AI when you ask for one in chat.\n\
        {cmd} task list - reminders in this conversation or created by you\n\
        {cmd} task clear - remove all reminders (permission {threshold}+)\n\
        {cmd} task help - show this help"
    )
}

pub fn usage_prompt(cmd: &str) -> String {
    format!("Please enter a message for the AI, e.g. {cmd} hello")
}

/// Map any dispatch error to one reply
pub fn error_reply(err: &DispatchError, cmd: &str) -> String {
    match err {
        DispatchError::Validation(ValidationError::EmptyMessage) => usage_prompt(cmd),
        DispatchError::Validation(ValidationError::MessageTooLong { len, max }) => format!(
            "❌ Message too long: {} characters (limit {}). Please shorten it.",
            len, max
        ),
        DispatchError::Validation(other) => format!("❌ {}", other),
        DispatchError::PermissionDenied { required, actual } => format!(
            "❌ Permission denied: level {} required (yours is {}).",
            required, actual
        ),
        DispatchError::ConfigMissing(key) => format!(
            "❌ Cannot enable free chat: `{}` is not configured.\n\
            Set it in the settings file or CHATBRIDGE_BOT_IDENTIFIER, then run {} free on again.",
            key, cmd
        ),
        DispatchError::Backend(e) => chat_failure(e, cmd),
        DispatchError::Internal(_) => COMMAND_FAILED.to_string(),
    }
}

/// Chat call failed before a reply came back
pub fn chat_failure(err: &BackendError, cmd: &str) -> String {
    match err {
        BackendError::Unreachable(_) => format!(
            "❌ Cannot connect to the AI service. Make sure the backend is running, then run {} test.",
            cmd
        ),
        BackendError::Timeout(timeout) => format!(
            "⏱️ The AI service did not answer within {}s. Try again later or run {} test.",
            timeout.as_secs(),
            cmd
        ),
        BackendError::BadStatus { code, detail } => match detail {
            Some(detail) => format!("❌ AI service error (HTTP {}): {}\nRun {} test to check the service.", code, detail, cmd),
            None => format!("❌ AI service error (HTTP {}). Run {} test to check the service.", code, cmd),
        },
        BackendError::MalformedResponse(_) => format!(
            "❌ The AI service sent an unexpected response. Run {} test to check the service.",
            cmd
        ),
    }
}

/// Backend answered with `success: false`
pub fn chat_rejected(error: Option<&str>, cmd: &str) -> String {
    format!(
        "❌ AI reply failed: {}\nRun {} test if this keeps happening.",
        error.unwrap_or("unknown error"),
        cmd
    )
}

pub fn service_unavailable(cmd: &str) -> String {
    format!("❌ The AI service is temporarily unavailable. Run {} test for details.", cmd)
}

pub fn health_report(health: &HealthStatus) -> String {
    let mut text = if health.is_healthy() {
        "✅ AI service is healthy".to_string()
    } else {
        format!("⚠️ AI service is reachable but reports status \"{}\"", health.status)
    };
    text.push_str(&format!(
        "\nAPI key configured: {}",
        if health.api_configured { "yes" } else { "no" }
    ));
    if let Some(warning) = &health.warning {
        text.push_str(&format!("\nWarning: {}", warning));
    }
    if let Some(error) = &health.error {
        text.push_str(&format!("\nError: {}", error));
    }
    text
}

pub fn health_failure(err: &BackendError) -> String {
    match err {
        BackendError::Unreachable(_) | BackendError::Timeout(_) => format!(
            "❌ Connection to the AI service failed: {}\nCheck that the backend is running and the URL is correct.",
            err
        ),
        BackendError::BadStatus { .. } | BackendError::MalformedResponse(_) => format!(
            "⚠️ AI service is reachable but degraded: {}{}",
            err,
            err.detail().map(|d| format!(" ({})", d)).unwrap_or_default()
        ),
    }
}

fn troubleshooting_hint(cmd: &str) -> String {
    format!("Run {} test to check the AI service, or contact the administrator.", cmd)
}

pub fn clear_success(scope: &ConversationScope) -> String {
    format!(
        "✅ Conversation history for {} cleared. You can start a new conversation.",
        ConversationScope::label(&scope.scope_id)
    )
}

pub fn clear_failure(message: &str, cmd: &str) -> String {
    format!("❌ Failed to clear history: {}\n{}", message, troubleshooting_hint(cmd))
}

/// One line per scope: direct chats first, then groups in id order
pub fn conversation_list(conversations: &BTreeMap<String, u64>) -> String {
    if conversations.is_empty() {
        return "No conversations recorded yet.".to_string();
    }

    let private = conversations.get_key_value(PRIVATE_SCOPE);
    private
        .into_iter()
        .chain(conversations.iter().filter(|(k, _)| k.as_str() != PRIVATE_SCOPE))
        .map(|(scope, count)| {
            format!(
                "{}: {} message{}",
                ConversationScope::label(scope),
                count,
                if *count == 1 { "" } else { "s" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn list_failure(message: &str, cmd: &str) -> String {
    format!("❌ Failed to fetch conversations: {}\n{}", message, troubleshooting_hint(cmd))
}

/// Backend error text, verbatim when the backend supplied one
pub fn backend_message(err: &BackendError) -> String {
    err.detail().map(str::to_string).unwrap_or_else(|| err.to_string())
}

pub fn free_status(enabled: bool, identifier: Option<&str>) -> String {
    format!(
        "Free chat is {}.\nBot identifier: {}",
        if enabled { "on" } else { "off" },
        identifier.unwrap_or("not set")
    )
}

pub fn free_enabled(identifier: &str) -> String {
    format!(
        "✅ Free chat enabled: messages mentioning @{} are sent to the AI.",
        identifier
    )
}

pub const FREE_DISABLED: &str = "✅ Free chat disabled: only explicit commands are answered.";

pub fn free_usage(cmd: &str) -> String {
    format!("Usage: {} free [on|off|status]", cmd)
}

pub fn task_confirmation(job: &ScheduledJob) -> String {
    let mut text = format!(
        "\n\n📅 Task scheduled\n\
        Kind: {}\n\
        Schedule: {}\n\
        Description: {}\n\
        ID: {}",
        job.descriptor.kind, job.descriptor.schedule_value, job.descriptor.description, job.job_id
    );
    if let Some(next) = job.next_fire_at {
        text.push_str(&format!("\nNext run: {}", next.format("%Y-%m-%d %H:%M")));
    }
    text
}

pub const TASK_FAILED: &str = "\n\n⚠️ Task creation failed; no reminder was scheduled.";

pub fn task_permission_note(threshold: u32) -> String {
    format!(
        "\n\n⚠️ Reminder not scheduled: creating tasks needs permission level {}.",
        threshold
    )
}

pub fn task_list(jobs: &[ScheduledJob]) -> String {
    if jobs.is_empty() {
        return "No scheduled tasks in this conversation.".to_string();
    }

    let mut text = format!("📅 Scheduled tasks ({})", jobs.len());
    for job in jobs {
        text.push_str(&format!(
            "\n• {} [{} {}] {} (by {}",
            job.job_id,
            job.descriptor.kind,
            job.descriptor.schedule_value,
            job.descriptor.description,
            job.creator.display_name
        ));
        if let Some(next) = job.next_fire_at {
            text.push_str(&format!(", next {}", next.format("%m-%d %H:%M")));
        }
        if job.fire_count > 0 {
            text.push_str(&format!(", fired {}x", job.fire_count));
        }
        text.push(')');
    }
    text
}

pub fn task_cleared(removed: usize, still_armed: usize) -> String {
    let mut text = format!("🧹 Cleared {} task(s).", removed);
    if still_armed > 0 {
        text.push_str(&format!(
            "\n⚠️ {} task(s) could not be cancelled and may still fire until restart.",
            still_armed
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_conversation_list_labels() {
        let mut map = BTreeMap::new();
        map.insert("private".to_string(), 3);
        map.insert("group_42".to_string(), 10);
        let text = conversation_list(&map);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["direct: 3 messages", "group 42: 10 messages"]);
    }

    #[test]
    fn test_empty_list_is_distinct() {
        let text = conversation_list(&BTreeMap::new());
        assert!(!text.contains("❌"));
        assert!(text.contains("No conversations"));
    }

    #[test]
    fn test_chat_failures_suggest_test() {
        let errors = [
            BackendError::Unreachable("refused".into()),
            BackendError::Timeout(Duration::from_secs(30)),
            BackendError::BadStatus { code: 500, detail: Some("boom".into()) },
            BackendError::MalformedResponse("eof".into()),
        ];
        for err in &errors {
            assert!(chat_failure(err, ".chat").contains(".chat test"), "{:?}", err);
        }
        assert!(chat_failure(&errors[2], ".chat").contains("boom"));
    }

    #[test]
    fn test_health_failure_distinguishes_connection() {
        let down = health_failure(&BackendError::Unreachable("refused".into()));
        let degraded = health_failure(&BackendError::BadStatus { code: 503, detail: None });
        assert!(down.contains("Connection"));
        assert!(degraded.contains("degraded"));
    }
}
