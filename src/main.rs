use std::sync::Arc;
use task_tracker::config::{init_db, Config};
use task_tracker::modules::auth::MySqlAccountStore;
use task_tracker::modules::task::MySqlReminderStore;
use task_tracker::services::metrics::MetricsRegistry;
use task_tracker::services::notification::{
    EventPublisher, LogMailer, Mailer, NotificationConsumer, RedisBroker, SmtpMailer,
};
use task_tracker::services::reminder::{ReminderDispatcher, ReminderPoller};
use task_tracker::AppState;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_tracker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load environment configuration");

    let db = init_db(&config.database_url)
        .await
        .expect("Failed to connect to MySQL");
    tracing::info!("Connected to MySQL");

    let broker = Arc::new(
        RedisBroker::connect(&config.redis_url, &config.notification_queue)
            .await
            .expect("Failed to connect to Redis"),
    );
    if let Err(e) = broker.requeue_in_flight().await {
        tracing::error!("Failed to requeue in-flight notifications: {}", e);
    }
    tracing::info!("Connected to Redis");

    let metrics = MetricsRegistry::new().expect("Failed to create metrics registry");

    let mailer: Arc<dyn Mailer> = match &config.mail.smtp_url {
        Some(url) => Arc::new(SmtpMailer::new(url, &config.mail).expect("Invalid SMTP_URL")),
        None => {
            tracing::warn!("SMTP_URL not set, notifications will only be logged");
            Arc::new(LogMailer::new(&config.mail))
        }
    };

    let accounts = Arc::new(MySqlAccountStore::new(db.clone()));
    let reminders = Arc::new(MySqlReminderStore::new(db, config.poller.batch_limit));
    let publisher = EventPublisher::new(broker.clone());

    let cancel = CancellationToken::new();

    let dispatcher = ReminderDispatcher::new(reminders.clone(), publisher.clone())
        .with_metrics(metrics.clone());
    let poller = ReminderPoller::new(reminders, dispatcher, &config.poller)
        .with_metrics(metrics.clone());
    let poller_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { poller.run(cancel).await }
    });

    let consumer = NotificationConsumer::new(broker, mailer).with_metrics(metrics.clone());
    let consumer_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.run(cancel).await }
    });

    let state = AppState::new(accounts, publisher, &config.token, config.lockout, metrics);
    let app = task_tracker::create_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Server running on http://{}", config.bind_addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await
        .expect("Server error");

    cancel.cancel();
    let _ = tokio::join!(poller_task, consumer_task);
    tracing::info!("Background workers stopped");
}
