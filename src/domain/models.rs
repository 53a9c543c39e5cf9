use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORK_DURATION_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_DURATION_MINUTES: u32 = 5;
pub const WORK_DURATION_RANGE: std::ops::RangeInclusive<u32> = 1..=60;
pub const BREAK_DURATION_RANGE: std::ops::RangeInclusive<u32> = 1..=30;
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub type UserId = i64;
pub type TaskId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unsupported task status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub pomodoros_needed: u32,
    pub completed_pomodoros: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "task.title")?;
        if self.pomodoros_needed == 0 {
            return Err("task.pomodoros_needed must be >= 1".to_string());
        }
        if self.completed_pomodoros > self.pomodoros_needed {
            return Err("task.completed_pomodoros must be <= task.pomodoros_needed".to_string());
        }
        match (self.status, self.completed_at) {
            (TaskStatus::Pending, Some(_)) => {
                Err("task.completed_at must be empty while pending".to_string())
            }
            (TaskStatus::Completed, None) => {
                Err("task.completed_at is required once completed".to_string())
            }
            _ => Ok(()),
        }
    }

    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.completed_pomodoros, self.pomodoros_needed)
    }
}

/// Input accepted when creating a task, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pomodoros_needed: Option<serde_json::Value>,
}

impl NewTask {
    /// Trims text fields and applies the default target of one pomodoro when
    /// the requested count is missing or not a positive integer.
    pub fn normalize(self) -> Result<(String, Option<String>, u32), String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("Task title is required".to_string());
        }
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        let pomodoros_needed = self
            .pomodoros_needed
            .as_ref()
            .and_then(positive_count)
            .unwrap_or(1);
        Ok((title.to_string(), description, pomodoros_needed))
    }
}

fn positive_count(value: &serde_json::Value) -> Option<u32> {
    let parsed = match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(raw) => raw.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(parsed).ok().filter(|count| *count >= 1)
}

/// Authoritative progress reported after an interval is recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntervalProgress {
    pub completed_pomodoros: u32,
    pub pomodoros_needed: u32,
    pub is_complete: bool,
}

impl IntervalProgress {
    pub fn new(completed_pomodoros: u32, pomodoros_needed: u32) -> Self {
        Self {
            completed_pomodoros,
            pomodoros_needed,
            is_complete: completed_pomodoros >= pomodoros_needed,
        }
    }

    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.completed_pomodoros, self.pomodoros_needed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub already_completed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub work_duration: u32,
    pub break_duration: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_duration: DEFAULT_WORK_DURATION_MINUTES,
            break_duration: DEFAULT_BREAK_DURATION_MINUTES,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        if !WORK_DURATION_RANGE.contains(&self.work_duration)
            || !BREAK_DURATION_RANGE.contains(&self.break_duration)
        {
            return Err(
                "Invalid duration values. Work duration must be between 1-60 minutes and break duration between 1-30 minutes."
                    .to_string(),
            );
        }
        Ok(())
    }

    pub fn work_seconds(&self) -> u32 {
        self.work_duration * 60
    }

    pub fn break_seconds(&self) -> u32 {
        self.break_duration * 60
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.username, "username")?;
        validate_non_empty(&self.email, "email")?;
        if !self.email.contains('@') {
            return Err("email must be a valid address".to_string());
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            ));
        }
        Ok(())
    }
}

/// The authenticated user a request acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: UserId,
    pub username: String,
}

fn progress_percent(completed: u32, needed: u32) -> f64 {
    if needed == 0 {
        return 0.0;
    }
    f64::from(completed) * 100.0 / f64::from(needed)
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
