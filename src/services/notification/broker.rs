use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use super::types::{ChannelError, NotificationEvent};

/// At-least-once message transport for notification events.
///
/// `receive` returns `Ok(None)` when nothing arrived within the broker's idle
/// wait, so callers can check for shutdown between polls.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), ChannelError>;
    async fn receive(&self) -> Result<Option<Delivery>, ChannelError>;
}

#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self, payload: &str) -> Result<(), ChannelError>;
}

/// A received message. Until `ack` is called the broker may hand it out again.
pub struct Delivery {
    payload: String,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(payload: String, acker: Box<dyn Acknowledge>) -> Self {
        Self { payload, acker }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn event(&self) -> Result<NotificationEvent, ChannelError> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    pub async fn ack(self) -> Result<(), ChannelError> {
        self.acker.ack(&self.payload).await
    }
}

// =============================================================================
// REDIS
// =============================================================================

/// Reliable queue on two Redis lists: publishers `LPUSH` onto `queue`, the
/// consumer `LMOVE`s from its tail into `processing`, and an ack `LREM`s the
/// payload from `processing`. Anything left in `processing` after a crash is
/// pushed back by `requeue_in_flight`.
pub struct RedisBroker {
    connection: ConnectionManager,
    queue: String,
    processing: String,
    idle_wait: Duration,
}

impl RedisBroker {
    pub async fn connect(redis_url: &str, queue: &str) -> Result<Self, ChannelError> {
        tracing::info!("Connecting to Redis at {}", redis_url);

        let client = Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            queue: queue.to_string(),
            processing: format!("{}:processing", queue),
            idle_wait: Duration::from_millis(500),
        })
    }

    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// Moves unacknowledged messages back onto the queue, oldest first in line.
    pub async fn requeue_in_flight(&self) -> Result<usize, ChannelError> {
        let mut conn = self.connection.clone();
        let mut moved = 0;

        loop {
            let item: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing)
                .arg(&self.queue)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;

            match item {
                Some(_) => moved += 1,
                None => break,
            }
        }

        if moved > 0 {
            tracing::warn!("Requeued {} unacknowledged notification(s)", moved);
        }
        Ok(moved)
    }
}

struct RedisAck {
    connection: ConnectionManager,
    processing: String,
}

#[async_trait]
impl Acknowledge for RedisAck {
    async fn ack(&self, payload: &str) -> Result<(), ChannelError> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.connection.clone();

        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.queue)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, ChannelError> {
        let mut conn = self.connection.clone();

        let payload: Option<String> = redis::cmd("LMOVE")
            .arg(&self.queue)
            .arg(&self.processing)
            .arg("RIGHT")
            .arg("LEFT")
            .query_async(&mut conn)
            .await?;

        match payload {
            Some(payload) => Ok(Some(Delivery::new(
                payload,
                Box::new(RedisAck {
                    connection: self.connection.clone(),
                    processing: self.processing.clone(),
                }),
            ))),
            None => {
                tokio::time::sleep(self.idle_wait).await;
                Ok(None)
            }
        }
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

struct CountingAck {
    acked: Arc<AtomicUsize>,
}

#[async_trait]
impl Acknowledge for CountingAck {
    async fn ack(&self, _payload: &str) -> Result<(), ChannelError> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Process-local broker over a tokio channel. It can refuse every publish, or
/// only those addressed to given receivers, to simulate an outage.
pub struct InMemoryBroker {
    sender: mpsc::UnboundedSender<String>,
    receiver: Mutex<mpsc::UnboundedReceiver<String>>,
    published: Mutex<Vec<NotificationEvent>>,
    rejecting: AtomicBool,
    rejected_receivers: Mutex<HashSet<String>>,
    acked: Arc<AtomicUsize>,
    idle_wait: Duration,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            published: Mutex::new(Vec::new()),
            rejecting: AtomicBool::new(false),
            rejected_receivers: Mutex::new(HashSet::new()),
            acked: Arc::new(AtomicUsize::new(0)),
            idle_wait: Duration::from_millis(20),
        }
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub async fn reject_receiver(&self, receiver: &str) {
        self.rejected_receivers
            .lock()
            .await
            .insert(receiver.to_string());
    }

    /// Pushes a raw payload, bypassing encoding.
    pub fn push_raw(&self, payload: &str) -> Result<(), ChannelError> {
        self.sender
            .send(payload.to_string())
            .map_err(|_| ChannelError::Rejected("channel closed".to_string()))
    }

    pub async fn published(&self) -> Vec<NotificationEvent> {
        self.published.lock().await.clone()
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(ChannelError::Rejected("broker is down".to_string()));
        }
        if self.rejected_receivers.lock().await.contains(&event.receiver) {
            return Err(ChannelError::Rejected(format!(
                "receiver {} refused",
                event.receiver
            )));
        }

        let payload = serde_json::to_string(event)?;
        self.push_raw(&payload)?;
        self.published.lock().await.push(event.clone());
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, ChannelError> {
        let mut receiver = self.receiver.lock().await;

        match tokio::time::timeout(self.idle_wait, receiver.recv()).await {
            Ok(Some(payload)) => Ok(Some(Delivery::new(
                payload,
                Box::new(CountingAck {
                    acked: self.acked.clone(),
                }),
            ))),
            Ok(None) | Err(_) => Ok(None),
        }
    }
}
