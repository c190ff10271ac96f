//! Timer facility
//!
//! Jobs are handed to a [`TimerHost`] together with a fire callback. The
//! host owns the waiting; the manager only keeps the returned handle.

use chrono::{DateTime, Local};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info};

use super::descriptor::Trigger;

/// Invoked on every fire with the fire timestamp
pub type FireCallback = Arc<dyn Fn(DateTime<Local>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle to a scheduled timer.
///
/// Hosts without a cancellation primitive return [`TimerHandle::detached`].
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Handle that cannot stop its timer
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn is_cancellable(&self) -> bool {
        self.cancel.is_some()
    }

    /// Stop the timer. Returns false when the host cannot cancel it.
    pub fn cancel(mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => {
                cancel();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancellable", &self.is_cancellable())
            .finish()
    }
}

/// Host timer facility
pub trait TimerHost: Send + Sync {
    fn schedule(&self, job_id: &str, trigger: Trigger, on_fire: FireCallback) -> TimerHandle;
}

/// Timer backed by one tokio task per job
#[derive(Debug, Default, Clone)]
pub struct TokioTimer;

impl TimerHost for TokioTimer {
    fn schedule(&self, job_id: &str, trigger: Trigger, on_fire: FireCallback) -> TimerHandle {
        let job_id = job_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                let now = Local::now();
                let next = match trigger.next_after(now) {
                    Some(next) => next,
                    // a one-shot whose instant already passed fires right away
                    None if !trigger.is_recurring() => now,
                    None => break,
                };
                let wait = (next - now).to_std().unwrap_or_default();
                debug!("Job {} sleeping {:?} until {}", job_id, wait, next);
                tokio::time::sleep(wait).await;

                on_fire(Local::now()).await;

                if !trigger.is_recurring() {
                    break;
                }
            }
            info!("Timer for job {} finished", job_id);
        });

        TimerHandle::new(move || task.abort())
    }
}
