//! Task descriptors and the triggers they resolve to

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ValidationError;

/// Kind of schedule requested by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    /// Cron expression (recurring) or a delay (fires once)
    #[serde(alias = "one_shot_cron", alias = "cron")]
    OneShotCron,
    /// Every day at a fixed local time
    #[serde(alias = "daily_at", alias = "daily")]
    DailyAt,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneShotCron => "ONE_SHOT_CRON",
            Self::DailyAt => "DAILY_AT",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task extracted by the backend from an approved reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub schedule_value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub action_text: String,
}

impl TaskDescriptor {
    pub fn new(kind: TaskKind, schedule_value: &str, description: &str, action_text: &str) -> Self {
        Self {
            kind,
            schedule_value: schedule_value.to_string(),
            description: description.to_string(),
            action_text: action_text.to_string(),
        }
    }
}

/// Resolved schedule
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Recurring cron schedule
    Cron(Box<cron::Schedule>),
    /// Daily at a local time of day
    DailyAt(NaiveTime),
    /// Fires exactly once
    Once(DateTime<Local>),
}

impl Trigger {
    /// Validate a descriptor's schedule and resolve it relative to `now`.
    ///
    /// Fails closed: anything without an upcoming fire time is rejected.
    pub fn resolve(
        kind: TaskKind,
        value: &str,
        now: DateTime<Local>,
    ) -> Result<Self, ValidationError> {
        let value = value.trim();
        let malformed = |reason: &str| ValidationError::MalformedSchedule {
            kind: kind.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(malformed("empty schedule value"));
        }

        let trigger = match kind {
            TaskKind::DailyAt => Self::DailyAt(parse_time_of_day(value).ok_or_else(|| {
                malformed("expected a time of day as HH:MM or HH:MM:SS")
            })?),
            TaskKind::OneShotCron => {
                if looks_like_cron(value) {
                    let normalized = normalize_cron_expr(value);
                    let schedule = cron::Schedule::from_str(&normalized)
                        .map_err(|e| malformed(&format!("invalid cron expression: {}", e)))?;
                    Self::Cron(Box::new(schedule))
                } else {
                    let delay = parse_interval(value).ok_or_else(|| {
                        malformed("expected a cron expression or an interval like 30m, 2h, 1d")
                    })?;
                    let delay = ChronoDuration::from_std(delay)
                        .map_err(|_| malformed("interval out of range"))?;
                    let at = now
                        .checked_add_signed(delay)
                        .ok_or_else(|| malformed("interval out of range"))?;
                    Self::Once(at)
                }
            }
        };

        if trigger.next_after(now).is_none() {
            return Err(malformed("schedule has no upcoming fire time"));
        }
        Ok(trigger)
    }

    /// Next fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        match self {
            Self::Cron(schedule) => schedule.after(&after).next(),
            Self::DailyAt(time) => {
                let mut day = after.date_naive();
                // two days covers a DST gap swallowing today's slot
                for _ in 0..3 {
                    let candidate = Local.from_local_datetime(&day.and_time(*time)).earliest();
                    if let Some(candidate) = candidate {
                        if candidate > after {
                            return Some(candidate);
                        }
                    }
                    day = day.succ_opt()?;
                }
                None
            }
            Self::Once(at) => (*at > after).then_some(*at),
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::Once(_))
    }
}

fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn looks_like_cron(value: &str) -> bool {
    value.starts_with('@') || value.split_whitespace().count() >= 5
}

/// The cron crate wants a seconds field; classic 5-field expressions get one
fn normalize_cron_expr(value: &str) -> String {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

/// Parse an interval like "30s", "10m", "2h", "1d" (optionally "in 10m")
pub fn parse_interval(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();
    let s = s.strip_prefix("in ").unwrap_or(&s).trim();
    let (idx, unit) = s.char_indices().last()?;
    let num: u64 = s[..idx].trim().parse().ok()?;
    if num == 0 {
        return None;
    }

    let secs = match unit {
        's' => num,
        'm' => num.checked_mul(60)?,
        'h' => num.checked_mul(3600)?,
        'd' => num.checked_mul(86400)?,
        _ => return None,
    };

    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 3, 10, h, m, 0)
            .single()
            .expect("unambiguous test time")
    }

    #[test]
    fn test_daily_at_valid() {
        let trigger = Trigger::resolve(TaskKind::DailyAt, "08:00", at(7, 0)).unwrap();
        let next = trigger.next_after(at(7, 0)).unwrap();
        assert_eq!((next.hour(), next.minute()), (8, 0));
        assert_eq!(next.date_naive(), at(7, 0).date_naive());

        // already past today: tomorrow
        let next = trigger.next_after(at(9, 0)).unwrap();
        assert_eq!(next.date_naive(), at(9, 0).date_naive().succ_opt().unwrap());
        assert!(trigger.is_recurring());
    }

    #[test]
    fn test_daily_at_rejects_out_of_range() {
        for bad in ["25:99", "24:00", "8am", "", "12:60"] {
            let result = Trigger::resolve(TaskKind::DailyAt, bad, at(7, 0));
            assert!(
                matches!(result, Err(ValidationError::MalformedSchedule { .. })),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_cron_macros_and_fields() {
        let hourly = Trigger::resolve(TaskKind::OneShotCron, "@hourly", at(7, 30)).unwrap();
        let next = hourly.next_after(at(7, 30)).unwrap();
        assert_eq!((next.hour(), next.minute()), (8, 0));

        let five_field = Trigger::resolve(TaskKind::OneShotCron, "*/15 * * * *", at(7, 1)).unwrap();
        assert_eq!(five_field.next_after(at(7, 1)).unwrap().minute(), 15);

        assert!(Trigger::resolve(TaskKind::OneShotCron, "@sometimes", at(7, 0)).is_err());
        assert!(Trigger::resolve(TaskKind::OneShotCron, "99 * * * *", at(7, 0)).is_err());
    }

    #[test]
    fn test_interval_fires_once() {
        let trigger = Trigger::resolve(TaskKind::OneShotCron, "in 30m", at(7, 0)).unwrap();
        assert!(!trigger.is_recurring());
        assert_eq!(trigger.next_after(at(7, 0)), Some(at(7, 30)));
        assert_eq!(trigger.next_after(at(7, 30)), None);
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_interval("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_interval("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_interval("1d"), Some(Duration::from_secs(86400)));
        assert_eq!(parse_interval("0m"), None);
        assert_eq!(parse_interval("soon"), None);
        assert_eq!(parse_interval("m"), None);
    }

    #[test]
    fn test_descriptor_kind_wire_names() {
        let d: TaskDescriptor = serde_json::from_str(
            r#"{"kind":"DAILY_AT","schedule_value":"08:00","description":"d","action_text":"a"}"#,
        )
        .unwrap();
        assert_eq!(d.kind, TaskKind::DailyAt);
        assert_eq!(TaskKind::OneShotCron.to_string(), "ONE_SHOT_CRON");
    }
}
