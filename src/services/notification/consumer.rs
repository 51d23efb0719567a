use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::broker::MessageBroker;
use super::mailer::Mailer;
use crate::services::metrics::MetricsRegistry;

const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outcome of handling a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Idle,
    Unavailable,
    Sent,
    MailFailed,
    Dropped,
}

impl ConsumeOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Unavailable => "unavailable",
            Self::Sent => "sent",
            Self::MailFailed => "mail_failed",
            Self::Dropped => "dropped",
        }
    }
}

/// Delivery worker: takes one event at a time off the broker and mails it.
/// Every received message is acked, including ones that failed to mail, so a
/// bad message is never redelivered forever.
pub struct NotificationConsumer {
    broker: Arc<dyn MessageBroker>,
    mailer: Arc<dyn Mailer>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl NotificationConsumer {
    pub fn new(broker: Arc<dyn MessageBroker>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            broker,
            mailer,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn process_next(&self) -> ConsumeOutcome {
        let delivery = match self.broker.receive().await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return ConsumeOutcome::Idle,
            Err(e) => {
                tracing::error!("Failed to receive notification: {}", e);
                return ConsumeOutcome::Unavailable;
            }
        };

        let outcome = match delivery.event() {
            Ok(event) => match self.mailer.send(&event).await {
                Ok(()) => ConsumeOutcome::Sent,
                Err(e) => {
                    tracing::error!(
                        receiver = %event.receiver,
                        notification_type = ?event.notification_type,
                        "Failed to deliver notification: {}",
                        e
                    );
                    ConsumeOutcome::MailFailed
                }
            },
            Err(e) => {
                tracing::error!(
                    payload = %delivery.payload(),
                    "Dropping undecodable notification: {}",
                    e
                );
                ConsumeOutcome::Dropped
            }
        };

        if let Err(e) = delivery.ack().await {
            tracing::error!("Failed to acknowledge notification: {}", e);
        }

        if let Some(metrics) = &self.metrics {
            metrics
                .notifications_consumed_total
                .with_label_values(&[outcome.label()])
                .inc();
        }

        outcome
    }

    /// Stops between messages once `cancel` fires; a message already received
    /// is finished and acked first.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("Notification consumer started");

        while !cancel.is_cancelled() {
            if self.process_next().await == ConsumeOutcome::Unavailable {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                }
            }
        }

        tracing::info!("Notification consumer stopped");
    }
}
