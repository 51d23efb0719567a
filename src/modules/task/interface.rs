use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{DueReminder, Reminder, ReminderOffset, Task, TaskStatus};
use crate::modules::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Unsent reminders of active tasks whose fire time (`scheduled_for + offset`)
    /// is at or before `now`, oldest first.
    async fn find_due_unsent_reminders(&self, now: DateTime<Utc>) -> Result<Vec<DueReminder>>;

    /// Flips `sent` to true. Returns `false` if it was already set, which is not
    /// an error.
    async fn mark_sent(&self, reminder_id: &str, sent_at: DateTime<Utc>) -> Result<bool>;

    /// Creates the task together with one reminder per offset.
    async fn create_task(&self, task: &Task, offsets: &[ReminderOffset]) -> Result<Vec<Reminder>>;

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<bool>;
}
