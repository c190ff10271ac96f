//! Dispatcher Integration Tests
//!
//! Drives the full command surface against an in-process backend, a timer
//! host that fires on demand and a notifier that records deliveries.

use async_trait::async_trait;
use chatbridge::backend::{ChatBackend, ChatReply, ChatRequest, ClearHistoryReply, HealthStatus};
use chatbridge::tasks::{FireCallback, TimerHandle, TimerHost, Trigger};
use chatbridge::{
    BackendError, Config, DispatchOutcome, Dispatcher, FeatureFlags, HostError, MemorySettings,
    MessageContext, Notifier, ReplyTarget, TaskManager,
};
use chrono::Local;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ----------------------------------------------------------------------------
// Test doubles
// ----------------------------------------------------------------------------

struct FakeBackend {
    chat_result: Mutex<Result<ChatReply, BackendError>>,
    health_result: Result<HealthStatus, BackendError>,
    conversations: BTreeMap<String, u64>,
    panic_on_chat: bool,
    chat_requests: Mutex<Vec<ChatRequest>>,
    cleared_scopes: Mutex<Vec<String>>,
    health_calls: Mutex<u32>,
}

impl FakeBackend {
    fn replying(reply: serde_json::Value) -> Self {
        Self {
            chat_result: Mutex::new(Ok(serde_json::from_value(reply).expect("valid reply"))),
            health_result: Ok(HealthStatus {
                status: "healthy".to_string(),
                api_configured: true,
                warning: None,
                error: None,
            }),
            conversations: BTreeMap::new(),
            panic_on_chat: false,
            chat_requests: Mutex::new(Vec::new()),
            cleared_scopes: Mutex::new(Vec::new()),
            health_calls: Mutex::new(0),
        }
    }

    fn plain(reply: &str) -> Self {
        Self::replying(json!({"success": true, "reply": reply}))
    }

    fn failing(err: BackendError) -> Self {
        let backend = Self::plain("unused");
        *backend.chat_result.lock().unwrap() = Err(err);
        backend
    }

    fn chat_count(&self) -> usize {
        self.chat_requests.lock().unwrap().len()
    }

    fn last_message(&self) -> Option<String> {
        self.chat_requests.lock().unwrap().last().map(|r| r.message.clone())
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn health(&self) -> Result<HealthStatus, BackendError> {
        *self.health_calls.lock().unwrap() += 1;
        self.health_result.clone()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        if self.panic_on_chat {
            panic!("backend exploded");
        }
        self.chat_requests.lock().unwrap().push(request.clone());
        self.chat_result.lock().unwrap().clone()
    }

    async fn clear_history(&self, scope_id: &str) -> Result<ClearHistoryReply, BackendError> {
        self.cleared_scopes.lock().unwrap().push(scope_id.to_string());
        Ok(serde_json::from_value(json!({"success": true, "message": "cleared"})).unwrap())
    }

    async fn list_conversations(&self) -> Result<BTreeMap<String, u64>, BackendError> {
        Ok(self.conversations.clone())
    }
}

/// Keeps every callback so tests can fire them by hand
#[derive(Default)]
struct ManualTimer {
    scheduled: Mutex<Vec<(String, FireCallback)>>,
    cancelled: Arc<Mutex<Vec<String>>>,
}

impl ManualTimer {
    fn count(&self) -> usize {
        self.scheduled.lock().unwrap().len()
    }

    async fn fire(&self, index: usize) {
        let callback = Arc::clone(&self.scheduled.lock().unwrap()[index].1);
        callback(Local::now()).await;
    }
}

impl TimerHost for ManualTimer {
    fn schedule(&self, job_id: &str, _trigger: Trigger, on_fire: FireCallback) -> TimerHandle {
        self.scheduled
            .lock()
            .unwrap()
            .push((job_id.to_string(), on_fire));
        let cancelled = Arc::clone(&self.cancelled);
        let job_id = job_id.to_string();
        TimerHandle::new(move || cancelled.lock().unwrap().push(job_id))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(ReplyTarget, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, target: &ReplyTarget, text: &str) -> Result<(), HostError> {
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), text.to_string()));
        Ok(())
    }
}

/// Every delivery fails, as when the host lost its connection
struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, target: &ReplyTarget, _text: &str) -> Result<(), HostError> {
        Err(HostError::SendFailed(format!("{} is gone", target)))
    }
}

struct Harness {
    dispatcher: Dispatcher,
    backend: Arc<FakeBackend>,
    timer: Arc<ManualTimer>,
    notifier: Arc<RecordingNotifier>,
    tasks: Arc<TaskManager>,
}

fn harness_with(backend: FakeBackend, config: Config) -> Harness {
    let backend = Arc::new(backend);
    let timer = Arc::new(ManualTimer::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let tasks = Arc::new(TaskManager::new(
        timer.clone(),
        notifier.clone(),
        config.task_permission,
    ));
    let flags = FeatureFlags::new(Box::new(MemorySettings::new()));
    let dispatcher = Dispatcher::new(backend.clone(), Arc::clone(&tasks), flags, &config);
    Harness {
        dispatcher,
        backend,
        timer,
        notifier,
        tasks,
    }
}

fn harness(backend: FakeBackend) -> Harness {
    harness_with(backend, Config::default())
}

fn from_user(text: &str, level: u32) -> MessageContext {
    MessageContext::direct("10001", "alice", text).with_permission(level)
}

fn hourly_reply() -> serde_json::Value {
    json!({
        "success": true,
        "reply": "Got it!",
        "task_info": {
            "kind": "ONE_SHOT_CRON",
            "schedule_value": "@hourly",
            "description": "hourly water reminder",
            "action_text": "drink water"
        }
    })
}

fn reply_text(outcome: DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Reply(text) => text,
        other => panic!("expected a reply, got {:?}", other),
    }
}

// ----------------------------------------------------------------------------
// Command surface
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_and_help_show_help() {
    let h = harness(FakeBackend::plain("hi"));
    for text in [".chat", ".chat help", "/chat 帮助", "。chat ?"] {
        assert_eq!(
            h.dispatcher.dispatch(&from_user(text, 0)).await,
            DispatchOutcome::ShowHelp,
            "{}",
            text
        );
    }
    assert_eq!(h.backend.chat_count(), 0);
    assert!(h.dispatcher.help_text().contains(".chat task"));
}

#[tokio::test]
async fn test_non_command_is_ignored() {
    let h = harness(FakeBackend::plain("hi"));
    let outcome = h.dispatcher.dispatch(&from_user("just talking", 0)).await;
    assert_eq!(outcome, DispatchOutcome::Ignored);
    assert_eq!(h.backend.chat_count(), 0);
}

#[tokio::test]
async fn test_synonyms_produce_same_outcome() {
    let h = harness(FakeBackend::plain("hi"));
    let a = h.dispatcher.dispatch(&from_user(".chat test", 0)).await;
    let b = h.dispatcher.dispatch(&from_user(".chat 状态", 0)).await;
    let c = h.dispatcher.dispatch(&from_user(".chat PING", 0)).await;
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert!(reply_text(a).contains("healthy"));
    assert_eq!(*h.backend.health_calls.lock().unwrap(), 3);
}

#[tokio::test]
async fn test_clear_uses_group_scope() {
    let h = harness(FakeBackend::plain("hi"));
    let ctx = from_user(".chat reset", 0).in_group("42");
    let text = reply_text(h.dispatcher.dispatch(&ctx).await);
    assert!(text.contains("group 42"), "{}", text);
    assert_eq!(*h.backend.cleared_scopes.lock().unwrap(), vec!["group_42".to_string()]);
}

#[tokio::test]
async fn test_list_renders_two_lines() {
    let mut backend = FakeBackend::plain("hi");
    backend.conversations.insert("private".to_string(), 3);
    backend.conversations.insert("group_42".to_string(), 10);
    let h = harness(backend);

    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat list", 0)).await);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("direct") && lines[0].contains('3'));
    assert!(lines[1].contains("group 42") && lines[1].contains("10"));
}

// ----------------------------------------------------------------------------
// Chat pipeline
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_chat_forwards_identity_and_scope() {
    let h = harness(FakeBackend::plain("hello back"));
    let ctx = from_user(".chat   how are you  ", 42).in_group("7");
    let text = reply_text(h.dispatcher.dispatch(&ctx).await);
    assert_eq!(text, "hello back");

    let requests = h.backend.chat_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].message, "how are you");
    assert_eq!(requests[0].user_id, "10001");
    assert_eq!(requests[0].display_name, "alice");
    assert_eq!(requests[0].scope_id, "group_7");
    assert_eq!(requests[0].permission_level, 42);
}

#[tokio::test]
async fn test_oversized_message_is_rejected_before_backend() {
    let h = harness(FakeBackend::plain("hi"));
    let long = format!(".chat {}", "x".repeat(2001));
    let text = reply_text(h.dispatcher.dispatch(&from_user(&long, 0)).await);
    assert!(text.contains("2001"), "{}", text);
    assert_eq!(h.backend.chat_count(), 0);

    let exact = format!(".chat {}", "x".repeat(2000));
    h.dispatcher.dispatch(&from_user(&exact, 0)).await;
    assert_eq!(h.backend.chat_count(), 1);
}

#[tokio::test]
async fn test_backend_failure_suggests_test() {
    let h = harness(FakeBackend::failing(BackendError::Unreachable("refused".into())));
    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat hi", 0)).await);
    assert!(text.contains(".chat test"), "{}", text);
}

#[tokio::test]
async fn test_backend_detail_is_surfaced() {
    let h = harness(FakeBackend::failing(BackendError::BadStatus {
        code: 400,
        detail: Some("message too long".into()),
    }));
    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat hi", 0)).await);
    assert!(text.contains("message too long"), "{}", text);
}

#[tokio::test]
async fn test_unsuccessful_reply_shows_error() {
    let h = harness(FakeBackend::replying(json!({
        "success": false,
        "error": "API key not configured"
    })));
    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat hi", 0)).await);
    assert!(text.contains("API key not configured"), "{}", text);
}

#[tokio::test]
async fn test_panic_degrades_to_retry_message() {
    let mut backend = FakeBackend::plain("hi");
    backend.panic_on_chat = true;
    let h = harness(backend);
    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat hi", 0)).await);
    assert!(text.contains("retry"), "{}", text);

    // still serving afterwards
    let outcome = h.dispatcher.dispatch(&from_user(".chat help", 0)).await;
    assert_eq!(outcome, DispatchOutcome::ShowHelp);
}

#[tokio::test]
async fn test_precheck_blocks_chat_when_unhealthy() {
    let mut backend = FakeBackend::plain("hi");
    backend.health_result = Err(BackendError::Unreachable("down".into()));
    let config = Config {
        precheck_health: true,
        ..Config::default()
    };
    let h = harness_with(backend, config);
    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat hi", 0)).await);
    assert!(text.contains("unavailable"), "{}", text);
    assert_eq!(h.backend.chat_count(), 0);
}

// ----------------------------------------------------------------------------
// Free chat
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_free_on_requires_identifier() {
    let h = harness(FakeBackend::plain("hi"));
    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat free on", 0)).await);
    assert!(text.contains("bot_identifier"), "{}", text);
    assert!(!h.dispatcher.flags().free_chat_enabled());
}

#[tokio::test]
async fn test_mention_routes_to_chat_when_enabled() {
    let h = harness(FakeBackend::plain("hey"));
    h.dispatcher.flags().seed_bot_identifier("HelperBot").unwrap();

    let mention = from_user("[CQ:at,qq=helperbot] what time is it", 0).in_group("9");
    assert_eq!(h.dispatcher.dispatch(&mention).await, DispatchOutcome::Ignored);

    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat free on", 0)).await);
    assert!(text.contains("HelperBot"), "{}", text);
    assert!(h.dispatcher.flags().free_chat_enabled());

    let text = reply_text(h.dispatcher.dispatch(&mention).await);
    assert_eq!(text, "hey");
    assert_eq!(h.backend.last_message().as_deref(), Some("what time is it"));

    // a bare mention prompts instead of calling the backend
    let bare = reply_text(h.dispatcher.dispatch(&from_user("@HelperBot  ", 0)).await);
    assert!(bare.contains(".chat"), "{}", bare);
    assert_eq!(h.backend.chat_count(), 1);

    h.dispatcher.dispatch(&from_user(".chat free off", 0)).await;
    assert_eq!(h.dispatcher.dispatch(&mention).await, DispatchOutcome::Ignored);
}

// ----------------------------------------------------------------------------
// Deferred tasks
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_hourly_reminder_scenario() {
    let h = harness(FakeBackend::replying(hourly_reply()));
    let ctx = from_user(".chat remind me to drink water every hour", 80);
    let text = reply_text(h.dispatcher.dispatch(&ctx).await);

    assert!(text.starts_with("Got it!"), "{}", text);
    assert!(text.contains("Task scheduled"));
    assert!(text.contains("@hourly"));
    assert_eq!(h.tasks.len(), 1);
    assert_eq!(h.timer.count(), 1);

    let listed = h.tasks.list_for(
        &chatbridge::identity::resolve_identity(&ctx),
        &chatbridge::identity::resolve_scope(&ctx),
    );
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].scope_id, "private");
    assert!(text.contains(&listed[0].job_id));
}

#[tokio::test]
async fn test_recurring_fire_notifies_captured_target() {
    let h = harness(FakeBackend::replying(hourly_reply()));
    let ctx = from_user(".chat remind me", 80).in_group("55");
    h.dispatcher.dispatch(&ctx).await;

    h.timer.fire(0).await;
    h.timer.fire(0).await;

    let sent = h.notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, ReplyTarget::Group { group_id: "55".into() });
    assert!(sent[0].1.contains("hourly water reminder"));
    assert!(sent[0].1.contains("drink water"));

    let job = h.tasks.list_for(
        &chatbridge::identity::resolve_identity(&ctx),
        &chatbridge::identity::resolve_scope(&ctx),
    )[0]
    .clone();
    assert_eq!(job.fire_count, 2);
    assert!(job.last_fired_at.is_some());
}

#[tokio::test]
async fn test_interval_job_removes_itself_after_firing() {
    let h = harness(FakeBackend::replying(json!({
        "success": true,
        "reply": "ok",
        "task_info": {"kind": "ONE_SHOT_CRON", "schedule_value": "10m", "description": "tea"}
    })));
    h.dispatcher.dispatch(&from_user(".chat tea in 10 minutes", 80)).await;
    assert_eq!(h.tasks.len(), 1);

    h.timer.fire(0).await;
    assert!(h.tasks.is_empty());
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_still_updates_registry() {
    let backend = Arc::new(FakeBackend::replying(hourly_reply()));
    let timer = Arc::new(ManualTimer::default());
    let tasks = Arc::new(TaskManager::new(timer.clone(), Arc::new(FailingNotifier), 60));
    let flags = FeatureFlags::new(Box::new(MemorySettings::new()));
    let dispatcher = Dispatcher::new(backend.clone(), Arc::clone(&tasks), flags, &Config::default());

    let ctx = from_user(".chat remind me", 80).in_group("55");
    dispatcher.dispatch(&ctx).await;
    *backend.chat_result.lock().unwrap() = Ok(serde_json::from_value(json!({
        "success": true,
        "reply": "ok",
        "task_info": {"kind": "ONE_SHOT_CRON", "schedule_value": "10m", "description": "tea"}
    }))
    .unwrap());
    dispatcher.dispatch(&ctx).await;
    assert_eq!(tasks.len(), 2);
    let hourly_id = timer.scheduled.lock().unwrap()[0].0.clone();
    let interval_id = timer.scheduled.lock().unwrap()[1].0.clone();

    timer.fire(0).await;
    timer.fire(1).await;

    let hourly = tasks.get(&hourly_id).expect("recurring job stays registered");
    assert_eq!(hourly.fire_count, 1);
    assert!(hourly.last_fired_at.is_some());
    assert!(tasks.get(&interval_id).is_none());
    assert_eq!(tasks.len(), 1);

    // dispatcher keeps serving after the failed deliveries
    assert_eq!(
        dispatcher.dispatch(&from_user(".chat help", 0)).await,
        DispatchOutcome::ShowHelp
    );
}

#[tokio::test]
async fn test_unknown_task_kind_fails_closed() {
    let h = harness(FakeBackend::replying(json!({
        "success": true,
        "reply": "Weekly it is",
        "task_info": {"kind": "WEEKLY", "schedule_value": "mon", "description": "standup"}
    })));
    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat every monday", 100)).await);
    assert!(text.starts_with("Weekly it is"), "{}", text);
    assert!(text.contains("Task creation failed"), "{}", text);
    assert!(h.tasks.is_empty());
    assert_eq!(h.timer.count(), 0);
}

#[tokio::test]
async fn test_low_permission_keeps_reply_but_skips_task() {
    let h = harness(FakeBackend::replying(hourly_reply()));
    let text = reply_text(
        h.dispatcher
            .dispatch(&from_user(".chat remind me every hour", 59))
            .await,
    );
    assert!(text.starts_with("Got it!"));
    assert!(text.contains("60"), "{}", text);
    assert!(h.tasks.is_empty());
    assert_eq!(h.timer.count(), 0);
}

#[tokio::test]
async fn test_malformed_schedule_fails_closed() {
    let h = harness(FakeBackend::replying(json!({
        "success": true,
        "reply": "Sure",
        "task_info": {"kind": "DAILY_AT", "schedule_value": "25:99", "description": "x"}
    })));
    let text = reply_text(h.dispatcher.dispatch(&from_user(".chat wake me", 100)).await);
    assert!(text.starts_with("Sure"));
    assert!(text.contains("Task creation failed"), "{}", text);
    assert!(h.tasks.is_empty());
    assert_eq!(h.timer.count(), 0);
}

#[tokio::test]
async fn test_task_list_and_clear() {
    let h = harness(FakeBackend::replying(hourly_reply()));
    h.dispatcher.dispatch(&from_user(".chat remind me", 80)).await;
    h.dispatcher.dispatch(&from_user(".chat remind me again", 80)).await;

    let listing = reply_text(h.dispatcher.dispatch(&from_user(".chat task", 0)).await);
    assert!(listing.contains("(2)"), "{}", listing);

    let denied = reply_text(h.dispatcher.dispatch(&from_user(".chat task clear", 10)).await);
    assert!(denied.contains("Permission denied"), "{}", denied);
    assert_eq!(h.tasks.len(), 2);

    let cleared = reply_text(h.dispatcher.dispatch(&from_user(".chat 任务 清除", 100)).await);
    assert!(cleared.contains("Cleared 2"), "{}", cleared);
    assert!(!cleared.contains("could not be cancelled"));
    assert!(h.tasks.is_empty());
    assert_eq!(h.timer.cancelled.lock().unwrap().len(), 2);

    let empty = reply_text(h.dispatcher.dispatch(&from_user(".chat task list", 0)).await);
    assert!(empty.contains("No scheduled tasks"));
}

#[tokio::test]
async fn test_cleared_job_does_not_resurrect_on_late_fire() {
    let h = harness(FakeBackend::replying(hourly_reply()));
    h.dispatcher.dispatch(&from_user(".chat remind me", 80)).await;
    h.dispatcher.dispatch(&from_user(".chat task clear", 100)).await;

    // a fire already in flight when clear ran
    h.timer.fire(0).await;
    assert!(h.tasks.is_empty());
}

#[tokio::test]
async fn test_dispatcher_is_shareable_across_tasks() {
    let h = harness(FakeBackend::plain("pong"));
    let dispatcher = Arc::new(h.dispatcher);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .dispatch(&from_user(&format!(".chat hi {}", i), 0))
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(reply_text(handle.await.unwrap()), "pong");
    }
    assert_eq!(h.backend.chat_count(), 8);
}
