use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Reminder cadence per priority, in milliseconds.
pub const HIGH_INTERVAL_MS: i64 = 2 * 60 * 60 * 1000;
pub const MEDIUM_INTERVAL_MS: i64 = 4 * 60 * 60 * 1000;
pub const LOW_INTERVAL_MS: i64 = 8 * 60 * 60 * 1000;

/// Final-warning lead time before the due date.
pub const FINAL_WARNING_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Fixed lookup: higher priority means more frequent nudges.
    pub fn reminder_interval_ms(self) -> i64 {
        match self {
            Priority::High => HIGH_INTERVAL_MS,
            Priority::Medium => MEDIUM_INTERVAL_MS,
            Priority::Low => LOW_INTERVAL_MS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "med" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{other}' (expected low/medium/high)")),
        }
    }
}

/// A task record as persisted in the store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Local>>,
    pub completed: bool,
    pub created_at: DateTime<Local>,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            priority: Priority::default(),
            due_date: None,
            completed: false,
            created_at: Local::now(),
        }
    }
}

impl Task {
    pub fn new(title: impl Into<String>, priority: Priority, due_date: Option<DateTime<Local>>) -> Self {
        let now = Local::now();
        Self {
            id: now.timestamp_millis().to_string(),
            title: title.into(),
            priority,
            due_date,
            completed: false,
            created_at: now,
        }
    }

    pub fn due_millis(&self) -> Option<i64> {
        self.due_date.map(|d| d.timestamp_millis())
    }

    /// True when the task still needs a reminder schedule at all.
    pub fn wants_reminders(&self) -> bool {
        !self.completed && self.due_date.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    TaskReminder,
    MorningSummary,
}

/// Snapshot of one live scheduled reminder, for inspection and logging.
/// The owning timer handle stays inside the scheduler registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderInfo {
    pub task_id: String,
    pub kind: ReminderKind,
    pub fires_at_ms: i64,
}

/// Persisted notification grant state (mirrors the platform permission).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GrantState {
    #[default]
    Unset,
    Granted,
    Denied,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_intervals() {
        assert_eq!(Priority::High.reminder_interval_ms(), 2 * 3_600_000);
        assert_eq!(Priority::Medium.reminder_interval_ms(), 4 * 3_600_000);
        assert_eq!(Priority::Low.reminder_interval_ms(), 8 * 3_600_000);
    }

    #[test]
    fn priority_parses_case_insensitive() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("med".parse::<Priority>().unwrap(), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn task_record_round_trips_camel_case() {
        let json = r#"{"id":"1712","title":"water plants","priority":"high","dueDate":"2026-03-01T09:00:00+01:00","completed":false,"createdAt":"2026-02-20T08:00:00+01:00"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.priority, Priority::High);
        assert!(task.wants_reminders());
        let out = serde_json::to_string(&task).unwrap();
        assert!(out.contains("\"dueDate\""));
        assert!(out.contains("\"createdAt\""));
    }

    #[test]
    fn completed_task_wants_no_reminders() {
        let mut task = Task::new("done", Priority::Low, Some(Local::now()));
        task.completed = true;
        assert!(!task.wants_reminders());
        let undated = Task::new("undated", Priority::High, None);
        assert!(!undated.wants_reminders());
    }
}
