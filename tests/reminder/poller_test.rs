use chrono::{Duration, TimeZone, Utc};
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;

use task_tracker::modules::task::{ReminderOffset, ReminderStore, TaskStatus};

use crate::common::ReminderContext;

#[tokio::test]
async fn one_hour_before_reminder_fires_inside_its_window() {
    let ctx = ReminderContext::new();
    let scheduled = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();
    let (email, _task, reminders) = ctx
        .add_task(scheduled, &[ReminderOffset::OneHourBefore])
        .await;

    let early = ctx
        .poller
        .run_once(scheduled - Duration::minutes(61))
        .await
        .unwrap();
    assert_eq!(early.found, 0);
    assert!(ctx.broker.published().await.is_empty());

    let report = ctx
        .poller
        .run_once(scheduled - Duration::minutes(59))
        .await
        .unwrap();
    assert_eq!(report.found, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);

    let published = ctx.broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].receiver, email);
    assert_eq!(published[0].replacements["{{DueDate}}"], "01-Jun-2030 12:00");

    let stored = ctx.store.reminder(&reminders[0].id).await.unwrap();
    assert!(stored.sent);
    assert_eq!(stored.sent_at, Some(scheduled - Duration::minutes(59)));
}

#[tokio::test]
async fn only_unsent_reminder_is_dispatched() {
    let ctx = ReminderContext::new();
    let scheduled = Utc::now() - Duration::minutes(5);
    let (_email, _task, reminders) = ctx
        .add_task(scheduled, &[ReminderOffset::AtTime, ReminderOffset::OneHourBefore])
        .await;

    ctx.store
        .mark_sent(&reminders[1].id, Utc::now())
        .await
        .unwrap();

    let report = ctx.poller.run_once(Utc::now()).await.unwrap();

    assert_eq!(report.found, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(ctx.broker.published().await.len(), 1);
    assert!(ctx.store.reminder(&reminders[0].id).await.unwrap().sent);
}

#[tokio::test]
async fn overlapping_iterations_flip_sent_once() {
    let ctx = ReminderContext::new();
    let (_email, _task, reminders) = ctx
        .add_task(Utc::now() - Duration::minutes(1), &[ReminderOffset::AtTime])
        .await;
    let now = Utc::now();

    let (a, b) = tokio::join!(ctx.poller.run_once(now), ctx.poller.run_once(now));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.delivered + b.delivered, 1);
    assert_eq!(a.failed + b.failed, 0);
    assert!(ctx.store.reminder(&reminders[0].id).await.unwrap().sent);

    let after = ctx.poller.run_once(Utc::now()).await.unwrap();
    assert_eq!(after.found, 0);
}

#[tokio::test]
async fn reminders_of_done_tasks_are_skipped() {
    let ctx = ReminderContext::new();
    let (_email, task, _reminders) = ctx
        .add_task(Utc::now() - Duration::minutes(1), &[ReminderOffset::AtTime])
        .await;

    ctx.store
        .update_task_status(&task.id, TaskStatus::InActive)
        .await
        .unwrap();

    let report = ctx.poller.run_once(Utc::now()).await.unwrap();
    assert_eq!(report.found, 0);
}

#[tokio::test]
async fn query_failure_is_reported_and_loop_recovers() {
    let ctx = ReminderContext::new();
    let (_email, _task, reminders) = ctx
        .add_task(Utc::now() - Duration::minutes(1), &[ReminderOffset::AtTime])
        .await;

    ctx.store.set_failing(true);
    assert!(ctx.poller.run_once(Utc::now()).await.is_err());

    let cancel = CancellationToken::new();
    let reminder_id = reminders[0].id.clone();

    let run = ctx.poller.run(cancel.clone());
    let recover = async {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        ctx.store.set_failing(false);

        for _ in 0..100 {
            if ctx.store.reminder(&reminder_id).await.is_some_and(|r| r.sent) {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        cancel.cancel();
    };

    tokio::time::timeout(StdDuration::from_secs(5), async { tokio::join!(run, recover) })
        .await
        .expect("poller did not stop");

    assert!(ctx.store.reminder(&reminder_id).await.unwrap().sent);
    assert_eq!(ctx.broker.published().await.len(), 1);
}

#[tokio::test]
async fn run_stops_promptly_when_cancelled() {
    let ctx = ReminderContext::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    tokio::time::timeout(StdDuration::from_secs(1), ctx.poller.run(cancel))
        .await
        .expect("poller ignored cancellation");
}
