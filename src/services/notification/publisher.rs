use std::sync::Arc;

use super::broker::MessageBroker;
use super::types::{ChannelError, NotificationEvent};

#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn MessageBroker>,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }

    pub async fn publish(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        tracing::debug!(
            receiver = %event.receiver,
            notification_type = ?event.notification_type,
            "Publishing notification"
        );

        self.broker.publish(event).await.map_err(|e| {
            tracing::error!(
                receiver = %event.receiver,
                "Failed to publish notification: {}",
                e
            );
            e
        })
    }

    /// Publishes and only logs on failure. For side notifications that must not
    /// fail the operation that triggered them.
    pub async fn publish_best_effort(&self, event: NotificationEvent) {
        let _ = self.publish(&event).await;
    }
}
