use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::interface::{ReminderStore, Result};
use super::model::{DueReminder, Reminder, ReminderOffset, Task, TaskStatus};
use crate::modules::StoreError;

#[derive(Default)]
struct State {
    owners: HashMap<String, String>,
    tasks: HashMap<String, Task>,
    reminders: HashMap<String, Reminder>,
}

/// Process-local reminder store. Queries can be made to fail to simulate a
/// database outage.
pub struct InMemoryReminderStore {
    state: RwLock<State>,
    batch_limit: usize,
    failing: AtomicBool,
    mark_sent_calls: AtomicUsize,
}

impl Default for InMemoryReminderStore {
    fn default() -> Self {
        Self::new(500)
    }
}

impl InMemoryReminderStore {
    pub fn new(batch_limit: usize) -> Self {
        Self {
            state: RwLock::new(State::default()),
            batch_limit,
            failing: AtomicBool::new(false),
            mark_sent_calls: AtomicUsize::new(0),
        }
    }

    /// Tasks join their owner's email the way the accounts table does in MySQL.
    pub async fn register_owner(&self, owner_id: &str, email: &str) {
        self.state
            .write()
            .await
            .owners
            .insert(owner_id.to_string(), email.to_string());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn reminder(&self, reminder_id: &str) -> Option<Reminder> {
        self.state.read().await.reminders.get(reminder_id).cloned()
    }

    pub fn mark_sent_calls(&self) -> usize {
        self.mark_sent_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reminder store is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn find_due_unsent_reminders(&self, now: DateTime<Utc>) -> Result<Vec<DueReminder>> {
        self.check_available()?;
        let state = self.state.read().await;

        let mut due: Vec<(DateTime<Utc>, DueReminder)> = state
            .reminders
            .values()
            .filter(|r| !r.sent)
            .filter_map(|r| {
                let task = state.tasks.get(&r.task_id)?;
                if task.status != TaskStatus::Active {
                    return None;
                }
                let fires_at = r.fires_at(task.scheduled_for);
                if fires_at > now {
                    return None;
                }
                let owner_email = state.owners.get(&task.owner_id)?.clone();

                Some((
                    fires_at,
                    DueReminder {
                        reminder_id: r.id.clone(),
                        task_id: task.id.clone(),
                        task_title: task.title.clone(),
                        task_description: task.description.clone(),
                        due_date: task.scheduled_for,
                        owner_email,
                    },
                ))
            })
            .collect();

        due.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.reminder_id.cmp(&b.1.reminder_id)));
        Ok(due
            .into_iter()
            .take(self.batch_limit)
            .map(|(_, reminder)| reminder)
            .collect())
    }

    async fn mark_sent(&self, reminder_id: &str, sent_at: DateTime<Utc>) -> Result<bool> {
        self.check_available()?;
        self.mark_sent_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.write().await;
        match state.reminders.get_mut(reminder_id) {
            Some(reminder) if !reminder.sent => {
                reminder.sent = true;
                reminder.sent_at = Some(sent_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_task(&self, task: &Task, offsets: &[ReminderOffset]) -> Result<Vec<Reminder>> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let reminders: Vec<Reminder> = offsets
            .iter()
            .map(|offset| Reminder {
                id: Uuid::new_v4().to_string(),
                task_id: task.id.clone(),
                offset_seconds: offset.seconds(),
                sent: false,
                sent_at: None,
            })
            .collect();

        state.tasks.insert(task.id.clone(), task.clone());
        for reminder in &reminders {
            state.reminders.insert(reminder.id.clone(), reminder.clone());
        }
        Ok(reminders)
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.write().await;
        match state.tasks.get_mut(task_id) {
            Some(task) => {
                task.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
