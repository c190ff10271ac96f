//! Deferred tasks
//!
//! Turns backend-approved task descriptors into independently firing jobs:
//! - `descriptor` - descriptor wire type and schedule validation
//! - `timer` - host timer facility (tokio implementation)
//! - `manager` - job registry, registration, listing and clearing

pub mod descriptor;
pub mod manager;
pub mod timer;

pub use descriptor::{parse_interval, TaskDescriptor, TaskKind, Trigger};
pub use manager::{render_notification, ClearReport, ScheduledJob, TaskError, TaskManager};
pub use timer::{FireCallback, TimerHandle, TimerHost, TokioTimer};
