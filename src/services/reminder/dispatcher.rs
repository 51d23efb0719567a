use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::modules::task::{DueReminder, ReminderStore};
use crate::modules::StoreError;
use crate::services::metrics::MetricsRegistry;
use crate::services::notification::{
    ChannelError, EventPublisher, NotificationEvent, NotificationType,
};

pub const DUE_DATE_FORMAT: &str = "%d-%b-%Y %H:%M";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("publish failed: {0}")]
    Publish(#[from] ChannelError),
    #[error("mark sent failed: {0}")]
    MarkSent(#[from] StoreError),
    #[error("dispatch task panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    fn label(&self) -> &'static str {
        match self {
            Self::Publish(_) => "publish_failed",
            Self::MarkSent(_) => "mark_failed",
            Self::Panicked(_) => "panicked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Published and flipped to sent by this call.
    Delivered,
    /// Published, but another dispatch had already flipped it.
    AlreadySent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub already_sent: usize,
    pub failed: usize,
    /// Reminder ids that stay unsent and will be retried on the next poll.
    pub failed_reminders: Vec<String>,
}

pub fn build_event(reminder: &DueReminder) -> NotificationEvent {
    NotificationEvent::new(&reminder.owner_email, NotificationType::UpcomingReminder)
        .with_replacement("{{TaskName}}", &reminder.task_title)
        .with_replacement(
            "{{TaskDescription}}",
            reminder.task_description.clone().unwrap_or_default(),
        )
        .with_replacement(
            "{{DueDate}}",
            reminder.due_date.format(DUE_DATE_FORMAT).to_string(),
        )
}

/// Publishes due reminders and marks them sent, one spawned task per reminder.
///
/// Publishing happens before marking, so a crash between the two re-sends the
/// reminder on the next poll rather than losing it.
#[derive(Clone)]
pub struct ReminderDispatcher {
    store: Arc<dyn ReminderStore>,
    publisher: EventPublisher,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ReminderDispatcher {
    pub fn new(store: Arc<dyn ReminderStore>, publisher: EventPublisher) -> Self {
        Self {
            store,
            publisher,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn dispatch_one(
        &self,
        reminder: &DueReminder,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let event = build_event(reminder);
        self.publisher.publish(&event).await?;

        if self.store.mark_sent(&reminder.reminder_id, now).await? {
            Ok(DispatchOutcome::Delivered)
        } else {
            Ok(DispatchOutcome::AlreadySent)
        }
    }

    /// Runs every reminder concurrently and waits for all of them. A failure or
    /// panic in one is logged and counted without affecting the others.
    pub async fn dispatch_all(
        &self,
        reminders: Vec<DueReminder>,
        now: DateTime<Utc>,
    ) -> DispatchSummary {
        let mut set = JoinSet::new();
        // A panicked task loses its output, so its ids are looked up by task Id.
        let mut spawned = HashMap::with_capacity(reminders.len());

        for reminder in reminders {
            let dispatcher = self.clone();
            let ids = (reminder.task_id.clone(), reminder.reminder_id.clone());
            let handle = set.spawn(async move {
                let started = Instant::now();
                let result = dispatcher.dispatch_one(&reminder, now).await;
                (reminder, result, started.elapsed().as_secs_f64())
            });
            spawned.insert(handle.id(), ids);
        }

        let mut summary = DispatchSummary::default();

        while let Some(joined) = set.join_next().await {
            let (reminder_id, task_id, result) = match joined {
                Ok((reminder, result, elapsed)) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.reminder_dispatch_duration_seconds.observe(elapsed);
                    }
                    (reminder.reminder_id, reminder.task_id, result)
                }
                Err(e) => {
                    let (task_id, reminder_id) = spawned.remove(&e.id()).unwrap_or_default();
                    (reminder_id, task_id, Err(DispatchError::Panicked(e.to_string())))
                }
            };

            let label = match &result {
                Ok(DispatchOutcome::Delivered) => {
                    summary.delivered += 1;
                    tracing::debug!(task_id = %task_id, reminder_id = %reminder_id, "Reminder sent");
                    "delivered"
                }
                Ok(DispatchOutcome::AlreadySent) => {
                    summary.already_sent += 1;
                    tracing::debug!(task_id = %task_id, "Reminder already marked sent");
                    "already_sent"
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        task_id = %task_id,
                        reminder_id = %reminder_id,
                        "Failed to dispatch reminder: {}",
                        e
                    );
                    let label = e.label();
                    summary.failed_reminders.push(reminder_id);
                    label
                }
            };

            if let Some(metrics) = &self.metrics {
                metrics
                    .reminders_dispatched_total
                    .with_label_values(&[label])
                    .inc();
            }
        }

        summary
    }
}
