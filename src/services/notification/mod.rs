pub mod broker;
pub mod consumer;
pub mod mailer;
pub mod publisher;
pub mod types;

pub use broker::{Delivery, InMemoryBroker, MessageBroker, RedisBroker};
pub use consumer::{ConsumeOutcome, NotificationConsumer};
pub use mailer::{LogMailer, MailError, Mailer, SmtpMailer};
pub use publisher::EventPublisher;
pub use types::{ChannelError, NotificationEvent, NotificationType};
