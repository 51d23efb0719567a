use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Active,
    /// Marked done by its owner.
    InActive,
    Deleted,
}

impl TaskStatus {
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Active => 1,
            Self::InActive => 2,
            Self::Deleted => 3,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            1 => Some(Self::Active),
            2 => Some(Self::InActive),
            3 => Some(Self::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub status: TaskStatus,
}

/// Canonical reminder offsets offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderOffset {
    AtTime,
    OneHourBefore,
    OneDayBefore,
}

impl ReminderOffset {
    /// Signed distance from the task's scheduled time; negative means before.
    pub fn seconds(self) -> i64 {
        match self {
            Self::AtTime => 0,
            Self::OneHourBefore => -3_600,
            Self::OneDayBefore => -86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Reminder {
    pub id: String,
    pub task_id: String,
    pub offset_seconds: i64,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Reminder {
    pub fn fires_at(&self, scheduled_for: DateTime<Utc>) -> DateTime<Utc> {
        scheduled_for + Duration::seconds(self.offset_seconds)
    }
}

/// A reminder whose fire time has passed, joined with what the notification needs.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DueReminder {
    pub reminder_id: String,
    pub task_id: String,
    pub task_title: String,
    pub task_description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub owner_email: String,
}
