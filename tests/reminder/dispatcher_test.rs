use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use task_tracker::modules::task::{
    DueReminder, InMemoryReminderStore, Reminder, ReminderOffset, ReminderStore, Task, TaskStatus,
};
use task_tracker::modules::StoreError;
use task_tracker::services::notification::{EventPublisher, InMemoryBroker};
use task_tracker::services::reminder::ReminderDispatcher;

use crate::common::ReminderContext;

#[tokio::test]
async fn publish_failure_for_one_reminder_does_not_block_another() {
    let ctx = ReminderContext::new();
    let past = Utc::now() - Duration::minutes(1);
    let (email_a, _task_a, reminders_a) = ctx.add_task(past, &[ReminderOffset::AtTime]).await;
    let (email_b, _task_b, reminders_b) = ctx.add_task(past, &[ReminderOffset::AtTime]).await;

    ctx.broker.reject_receiver(&email_a).await;

    let report = ctx.poller.run_once(Utc::now()).await.unwrap();

    assert_eq!(report.found, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);

    assert!(!ctx.store.reminder(&reminders_a[0].id).await.unwrap().sent);
    assert!(ctx.store.reminder(&reminders_b[0].id).await.unwrap().sent);

    let published = ctx.broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].receiver, email_b);

    // The failed one stays due for the next iteration.
    let next = ctx.poller.run_once(Utc::now()).await.unwrap();
    assert_eq!(next.found, 1);
}

#[tokio::test]
async fn broker_outage_leaves_reminders_unsent() {
    let ctx = ReminderContext::new();
    let (_email, _task, reminders) = ctx
        .add_task(Utc::now() - Duration::minutes(1), &[ReminderOffset::AtTime])
        .await;

    ctx.broker.set_rejecting(true);
    let report = ctx.poller.run_once(Utc::now()).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(ctx.store.mark_sent_calls(), 0);

    ctx.broker.set_rejecting(false);
    let report = ctx.poller.run_once(Utc::now()).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(ctx.store.reminder(&reminders[0].id).await.unwrap().sent);
}

#[tokio::test]
async fn mark_failure_after_publish_is_counted_and_event_still_sent() {
    let ctx = ReminderContext::new();
    let (_email, _task, _reminders) = ctx
        .add_task(Utc::now() - Duration::minutes(1), &[ReminderOffset::AtTime])
        .await;

    let due = ctx.store.find_due_unsent_reminders(Utc::now()).await.unwrap();
    let reminder_id = due[0].reminder_id.clone();
    ctx.store.set_failing(true);

    let summary = ctx.dispatcher.dispatch_all(due, Utc::now()).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.delivered, 0);
    assert_eq!(summary.failed_reminders, vec![reminder_id]);
    assert_eq!(ctx.broker.published().await.len(), 1);
}

/// Panics when asked to mark one specific reminder.
struct PanickingStore {
    inner: InMemoryReminderStore,
    poisoned: tokio::sync::Mutex<Option<String>>,
}

#[async_trait]
impl ReminderStore for PanickingStore {
    async fn find_due_unsent_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueReminder>, StoreError> {
        self.inner.find_due_unsent_reminders(now).await
    }

    async fn mark_sent(&self, reminder_id: &str, sent_at: DateTime<Utc>) -> Result<bool, StoreError> {
        if self.poisoned.lock().await.as_deref() == Some(reminder_id) {
            panic!("storage driver crashed");
        }
        self.inner.mark_sent(reminder_id, sent_at).await
    }

    async fn create_task(
        &self,
        task: &Task,
        offsets: &[ReminderOffset],
    ) -> Result<Vec<Reminder>, StoreError> {
        self.inner.create_task(task, offsets).await
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<bool, StoreError> {
        self.inner.update_task_status(task_id, status).await
    }
}

#[tokio::test]
async fn panic_in_one_dispatch_is_contained() {
    let store = Arc::new(PanickingStore {
        inner: InMemoryReminderStore::default(),
        poisoned: tokio::sync::Mutex::new(None),
    });
    store.inner.register_owner("owner-1", "owner@example.com").await;

    let past = Utc::now() - Duration::minutes(1);
    let mut reminder_ids = Vec::new();
    for title in ["first", "second"] {
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: "owner-1".to_string(),
            title: title.to_string(),
            description: None,
            scheduled_for: past,
            status: TaskStatus::Active,
        };
        let created = store
            .create_task(&task, &[ReminderOffset::AtTime])
            .await
            .unwrap();
        reminder_ids.push(created[0].id.clone());
    }
    *store.poisoned.lock().await = Some(reminder_ids[0].clone());

    let broker = Arc::new(InMemoryBroker::new());
    let dispatcher = ReminderDispatcher::new(store.clone(), EventPublisher::new(broker.clone()));

    let due = store.find_due_unsent_reminders(Utc::now()).await.unwrap();
    let summary = dispatcher.dispatch_all(due, Utc::now()).await;

    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_reminders, vec![reminder_ids[0].clone()]);
    assert!(store.inner.reminder(&reminder_ids[1]).await.unwrap().sent);
    assert!(!store.inner.reminder(&reminder_ids[0]).await.unwrap().sent);
}

#[tokio::test]
async fn event_carries_task_details() {
    let ctx = ReminderContext::new();
    let (email, task, _reminders) = ctx
        .add_task(Utc::now() - Duration::minutes(1), &[ReminderOffset::AtTime])
        .await;

    ctx.poller.run_once(Utc::now()).await.unwrap();

    let published = ctx.broker.published().await;
    let event = &published[0];
    assert_eq!(event.receiver, email);
    assert_eq!(event.subject, "You have an upcoming Task");
    assert_eq!(event.replacements["{{TaskName}}"], task.title);
    assert_eq!(event.replacements["{{TaskDescription}}"], "Team sync deck");
}
