use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;

use task_tracker::modules::task::ReminderOffset;
use task_tracker::services::notification::{
    ConsumeOutcome, InMemoryBroker, MessageBroker, NotificationConsumer, NotificationEvent,
    NotificationType,
};

use crate::common::{RecordingMailer, ReminderContext};

fn consumer_for(broker: Arc<InMemoryBroker>, mailer: Arc<RecordingMailer>) -> NotificationConsumer {
    NotificationConsumer::new(broker, mailer)
}

#[tokio::test]
async fn delivered_event_is_mailed_and_acked() {
    let broker = Arc::new(InMemoryBroker::new());
    let mailer = Arc::new(RecordingMailer::default());
    let consumer = consumer_for(broker.clone(), mailer.clone());

    let event = NotificationEvent::new("user@example.com", NotificationType::SignInSuccess)
        .with_replacement("{{FirstName}}", "Ada");
    broker.publish(&event).await.unwrap();

    assert_eq!(consumer.process_next().await, ConsumeOutcome::Sent);
    assert_eq!(mailer.sent().await, vec![event]);
    assert_eq!(broker.acked(), 1);
}

#[tokio::test]
async fn mail_failure_still_acks() {
    let broker = Arc::new(InMemoryBroker::new());
    let mailer = Arc::new(RecordingMailer::default());
    mailer.set_failing(true);
    let consumer = consumer_for(broker.clone(), mailer.clone());

    let event = NotificationEvent::new("user@example.com", NotificationType::UpcomingReminder);
    broker.publish(&event).await.unwrap();

    assert_eq!(consumer.process_next().await, ConsumeOutcome::MailFailed);
    assert_eq!(broker.acked(), 1);
    assert_eq!(consumer.process_next().await, ConsumeOutcome::Idle);
}

#[tokio::test]
async fn undecodable_payload_is_dropped_and_acked() {
    let broker = Arc::new(InMemoryBroker::new());
    let mailer = Arc::new(RecordingMailer::default());
    let consumer = consumer_for(broker.clone(), mailer.clone());

    broker.push_raw("not json").unwrap();

    assert_eq!(consumer.process_next().await, ConsumeOutcome::Dropped);
    assert_eq!(broker.acked(), 1);
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn empty_queue_is_idle() {
    let broker = Arc::new(InMemoryBroker::new());
    let consumer = consumer_for(broker.clone(), Arc::new(RecordingMailer::default()));

    assert_eq!(consumer.process_next().await, ConsumeOutcome::Idle);
    assert_eq!(broker.acked(), 0);
}

#[tokio::test]
async fn due_reminder_reaches_the_mailer() {
    let ctx = ReminderContext::new();
    let mailer = Arc::new(RecordingMailer::default());
    let consumer = consumer_for(ctx.broker.clone(), mailer.clone());

    let (email, task, _reminders) = ctx
        .add_task(Utc::now() - Duration::minutes(1), &[ReminderOffset::AtTime])
        .await;

    let report = ctx.poller.run_once(Utc::now()).await.unwrap();
    assert_eq!(report.delivered, 1);

    let cancel = CancellationToken::new();
    let run = consumer.run(cancel.clone());
    let wait = async {
        for _ in 0..100 {
            if !mailer.sent().await.is_empty() {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        cancel.cancel();
    };

    tokio::time::timeout(StdDuration::from_secs(5), async { tokio::join!(run, wait) })
        .await
        .expect("consumer did not stop");

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].receiver, email);
    assert_eq!(sent[0].notification_type, NotificationType::UpcomingReminder);
    assert_eq!(sent[0].replacements["{{TaskName}}"], task.title);
    assert_eq!(ctx.broker.acked(), 1);
}
