use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::dispatcher::ReminderDispatcher;
use crate::config::PollerConfig;
use crate::modules::task::ReminderStore;
use crate::modules::StoreError;
use crate::services::metrics::MetricsRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub found: usize,
    pub delivered: usize,
    pub already_sent: usize,
    pub failed: usize,
}

/// Background loop that finds due reminders and hands them to the dispatcher.
pub struct ReminderPoller {
    store: Arc<dyn ReminderStore>,
    dispatcher: ReminderDispatcher,
    delay: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ReminderPoller {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        dispatcher: ReminderDispatcher,
        config: &PollerConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            delay: config.delay,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// One iteration: query, fan out, wait for every dispatch to finish.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<IterationReport, StoreError> {
        let due = self.store.find_due_unsent_reminders(now).await?;
        let found = due.len();

        if found == 0 {
            return Ok(IterationReport::default());
        }

        tracing::info!("Dispatching {} due reminder(s)", found);
        let summary = self.dispatcher.dispatch_all(due, now).await;

        Ok(IterationReport {
            found,
            delivered: summary.delivered,
            already_sent: summary.already_sent,
            failed: summary.failed,
        })
    }

    /// Polls until `cancel` fires, sleeping a fixed delay after each iteration.
    /// An iteration already running completes before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("Reminder poller started (delay {:?})", self.delay);

        while !cancel.is_cancelled() {
            let result = match self.run_once(Utc::now()).await {
                Ok(report) => {
                    if report.failed > 0 {
                        tracing::warn!(
                            "Reminder iteration finished with {} failure(s) out of {}",
                            report.failed,
                            report.found
                        );
                    }
                    "ok"
                }
                Err(e) => {
                    tracing::error!("Failed to query due reminders: {}", e);
                    "query_failed"
                }
            };

            if let Some(metrics) = &self.metrics {
                metrics
                    .reminder_poll_iterations_total
                    .with_label_values(&[result])
                    .inc();
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        tracing::info!("Reminder poller stopped");
    }
}
