//! Deferred Task Manager
//!
//! Owns the process-wide registry of scheduled jobs. All mutation (register,
//! list, clear, fire bookkeeping) goes through the one lock in here, and no
//! lock is held across an await.

use chrono::{DateTime, Local};
use futures_util::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::descriptor::{TaskDescriptor, Trigger};
use super::timer::{FireCallback, TimerHandle, TimerHost};
use crate::error::{DispatchError, ValidationError};
use crate::host::Notifier;
use crate::identity::{ConversationScope, Identity, ReplyTarget};

/// Why a job was not created or cleared
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("permission level {actual} is below the required {required}")]
    PermissionDenied { required: u32, actual: u32 },
}

impl From<TaskError> for DispatchError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Invalid(e) => DispatchError::Validation(e),
            TaskError::PermissionDenied { required, actual } => {
                DispatchError::PermissionDenied { required, actual }
            }
        }
    }
}

/// A registered job
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJob {
    pub job_id: String,
    pub descriptor: TaskDescriptor,
    pub captured_context: ReplyTarget,
    pub creator: Identity,
    pub scope_id: String,
    pub created_at: DateTime<Local>,
    pub next_fire_at: Option<DateTime<Local>>,
    pub fire_count: u32,
    pub last_fired_at: Option<DateTime<Local>>,
}

/// Result of a clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Records removed from the registry
    pub removed: usize,
    /// Removed jobs whose timer was actually stopped
    pub cancelled: usize,
}

impl ClearReport {
    /// Removed jobs that may still fire because the host cannot cancel them
    pub fn still_armed(&self) -> usize {
        self.removed - self.cancelled
    }
}

struct JobEntry {
    job: ScheduledJob,
    timer: Option<TimerHandle>,
}

type Registry = Mutex<HashMap<String, JobEntry>>;

/// Validates descriptors and tracks the jobs they turn into
pub struct TaskManager {
    registry: Arc<Registry>,
    timer: Arc<dyn TimerHost>,
    notifier: Arc<dyn Notifier>,
    permission_threshold: u32,
}

impl TaskManager {
    pub fn new(
        timer: Arc<dyn TimerHost>,
        notifier: Arc<dyn Notifier>,
        permission_threshold: u32,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            timer,
            notifier,
            permission_threshold,
        }
    }

    pub fn permission_threshold(&self) -> u32 {
        self.permission_threshold
    }

    fn check_permission(&self, identity: &Identity) -> Result<(), TaskError> {
        if identity.permission_level < self.permission_threshold {
            return Err(TaskError::PermissionDenied {
                required: self.permission_threshold,
                actual: identity.permission_level,
            });
        }
        Ok(())
    }

    /// Validate and register a job.
    ///
    /// On any error the registry is left untouched and no timer is armed.
    pub fn register(
        &self,
        descriptor: TaskDescriptor,
        creator: &Identity,
        scope: &ConversationScope,
        target: ReplyTarget,
    ) -> Result<ScheduledJob, TaskError> {
        self.check_permission(creator)?;

        let now = Local::now();
        let trigger = Trigger::resolve(descriptor.kind, &descriptor.schedule_value, now)?;

        let mut registry = self.registry.lock();
        let job_id = loop {
            let candidate = generate_job_id(now);
            if !registry.contains_key(&candidate) {
                break candidate;
            }
        };

        let job = ScheduledJob {
            job_id: job_id.clone(),
            descriptor,
            captured_context: target,
            creator: creator.clone(),
            scope_id: scope.scope_id.clone(),
            created_at: now,
            next_fire_at: trigger.next_after(now),
            fire_count: 0,
            last_fired_at: None,
        };

        let callback = fire_callback(
            Arc::downgrade(&self.registry),
            Arc::clone(&self.notifier),
            job.clone(),
            trigger.clone(),
        );
        let timer = self.timer.schedule(&job_id, trigger, callback);

        registry.insert(
            job_id.clone(),
            JobEntry {
                job: job.clone(),
                timer: Some(timer),
            },
        );

        info!(
            "Registered job {} ({} {:?}) for {} in {}",
            job_id, job.descriptor.kind, job.descriptor.schedule_value, creator.user_id, job.scope_id
        );
        Ok(job)
    }

    /// Jobs in the caller's scope or created by the caller, oldest first
    pub fn list_for(&self, identity: &Identity, scope: &ConversationScope) -> Vec<ScheduledJob> {
        let mut jobs: Vec<ScheduledJob> = self
            .registry
            .lock()
            .values()
            .filter(|e| e.job.scope_id == scope.scope_id || e.job.creator.user_id == identity.user_id)
            .map(|e| e.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_id.cmp(&b.job_id)));
        jobs
    }

    /// Drop every job and stop the timers that can be stopped
    pub fn clear(&self, identity: &Identity) -> Result<ClearReport, TaskError> {
        self.check_permission(identity)?;

        let drained: Vec<JobEntry> = self.registry.lock().drain().map(|(_, e)| e).collect();

        let mut report = ClearReport {
            removed: drained.len(),
            cancelled: 0,
        };
        for entry in drained {
            if entry.timer.map(TimerHandle::cancel).unwrap_or(false) {
                report.cancelled += 1;
            } else {
                warn!("Job {} untracked but its timer could not be cancelled", entry.job.job_id);
            }
        }

        info!(
            "Cleared {} job(s) ({} cancelled) by {}",
            report.removed, report.cancelled, identity.user_id
        );
        Ok(report)
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, job_id: &str) -> Option<ScheduledJob> {
        self.registry.lock().get(job_id).map(|e| e.job.clone())
    }
}

/// `task_<unix millis>_<8 hex>`
fn generate_job_id(now: DateTime<Local>) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("task_{}_{:08x}", now.timestamp_millis(), suffix)
}

/// Text delivered when a job fires
pub fn render_notification(descriptor: &TaskDescriptor, fired_at: DateTime<Local>) -> String {
    let mut text = String::from("⏰ Scheduled reminder\n");
    if !descriptor.description.is_empty() {
        text.push_str(&descriptor.description);
        text.push('\n');
    }
    if !descriptor.action_text.is_empty() {
        text.push_str(&format!("👉 {}\n", descriptor.action_text));
    }
    text.push_str(&format!("🕒 {}", fired_at.format("%Y-%m-%d %H:%M:%S")));
    text
}

/// Fire callback: notify through the captured target, then update bookkeeping.
/// Nothing in here may escape; there is no caller left to report to.
fn fire_callback(
    registry: Weak<Registry>,
    notifier: Arc<dyn Notifier>,
    job: ScheduledJob,
    trigger: Trigger,
) -> FireCallback {
    let job = Arc::new(job);
    let trigger = Arc::new(trigger);
    Arc::new(move |fired_at: DateTime<Local>| {
        let registry = registry.clone();
        let notifier = Arc::clone(&notifier);
        let job = Arc::clone(&job);
        let trigger = Arc::clone(&trigger);
        async move {
            let text = render_notification(&job.descriptor, fired_at);
            match notifier.notify(&job.captured_context, &text).await {
                Ok(()) => debug!("Job {} delivered to {}", job.job_id, job.captured_context),
                Err(e) => warn!("Job {} failed to notify {}: {}", job.job_id, job.captured_context, e),
            }

            let Some(registry) = registry.upgrade() else {
                return;
            };
            let mut registry = registry.lock();
            if trigger.is_recurring() {
                if let Some(entry) = registry.get_mut(&job.job_id) {
                    entry.job.fire_count += 1;
                    entry.job.last_fired_at = Some(fired_at);
                    entry.job.next_fire_at = trigger.next_after(fired_at);
                }
            } else {
                registry.remove(&job.job_id);
            }
        }
        .boxed()
    })
}
