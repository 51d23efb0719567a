use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

const NAMESPACE: &str = "task_tracker";

/// Central metrics registry for the task tracker
pub struct MetricsRegistry {
    registry: Registry,

    // HTTP Metrics
    pub http_requests_total: CounterVec,
    pub http_request_duration_seconds: HistogramVec,

    // Auth Metrics
    pub auth_attempts_total: CounterVec,

    // Reminder Metrics
    pub reminder_poll_iterations_total: CounterVec,
    pub reminders_dispatched_total: CounterVec,
    pub reminder_dispatch_duration_seconds: Histogram,

    // Notification Metrics
    pub notifications_consumed_total: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        // HTTP Metrics
        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests").namespace(NAMESPACE),
            &["method", "endpoint", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration")
                .namespace(NAMESPACE)
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "endpoint"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        // Auth Metrics
        let auth_attempts_total = CounterVec::new(
            Opts::new("auth_attempts_total", "Authentication operations by outcome")
                .namespace(NAMESPACE),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(auth_attempts_total.clone()))?;

        // Reminder Metrics
        let reminder_poll_iterations_total = CounterVec::new(
            Opts::new("reminder_poll_iterations_total", "Reminder poller iterations")
                .namespace(NAMESPACE),
            &["result"],
        )?;
        registry.register(Box::new(reminder_poll_iterations_total.clone()))?;

        let reminders_dispatched_total = CounterVec::new(
            Opts::new("reminders_dispatched_total", "Due reminders processed by outcome")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(reminders_dispatched_total.clone()))?;

        let reminder_dispatch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "reminder_dispatch_duration_seconds",
                "Time to publish and mark one reminder",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(reminder_dispatch_duration_seconds.clone()))?;

        // Notification Metrics
        let notifications_consumed_total = CounterVec::new(
            Opts::new("notifications_consumed_total", "Notifications taken off the channel")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(notifications_consumed_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            auth_attempts_total,
            reminder_poll_iterations_total,
            reminders_dispatched_total,
            reminder_dispatch_duration_seconds,
            notifications_consumed_total,
        }))
    }

    pub fn record_auth(&self, operation: &str, outcome: &str) {
        self.auth_attempts_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
