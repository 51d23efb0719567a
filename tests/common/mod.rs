use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Barrier, Mutex};

use task_tracker::config::{LockoutPolicy, PollerConfig, TokenConfig};
use task_tracker::modules::auth::interface::Result as StoreResult;
use task_tracker::modules::auth::{Account, AccountStatus, AccountStore, InMemoryAccountStore, Role};
use task_tracker::modules::task::{
    InMemoryReminderStore, Reminder, ReminderOffset, ReminderStore, Task, TaskStatus,
};
use task_tracker::services::hashing;
use task_tracker::services::metrics::MetricsRegistry;
use task_tracker::services::notification::{
    EventPublisher, InMemoryBroker, MailError, Mailer, NotificationEvent,
};
use task_tracker::services::reminder::{ReminderDispatcher, ReminderPoller};
use task_tracker::services::session::SessionGate;
use task_tracker::services::token::TokenService;
use task_tracker::AppState;

pub const TEST_SECRET: &str = "integration-test-secret-at-least-32-chars";

// Allow dead_code for utilities used by other test files
#[allow(dead_code)]
pub struct TestContext {
    pub server: TestServer,
    pub accounts: Arc<InMemoryAccountStore>,
    pub broker: Arc<InMemoryBroker>,
    pub tokens: Arc<TokenService>,
    pub session: Arc<SessionGate>,
    pub metrics: Arc<MetricsRegistry>,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let metrics = MetricsRegistry::new().expect("Failed to create metrics registry");

        let state = AppState::new(
            accounts.clone(),
            EventPublisher::new(broker.clone()),
            &TokenConfig::new(TEST_SECRET),
            LockoutPolicy::default(),
            metrics.clone(),
        );
        let tokens = state.tokens.clone();
        let session = state.session.clone();

        let app = task_tracker::create_app(state);
        let server = TestServer::new(app).expect("Failed to create test server");

        Self {
            server,
            accounts,
            broker,
            tokens,
            session,
            metrics,
        }
    }

    pub async fn create_account(&self, status: AccountStatus) -> Account {
        let now = Utc::now();
        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            email: test_email(),
            given_name: "Test".to_string(),
            family_name: "User".to_string(),
            password_hash: hashing::hash_password(test_password()).expect("hash"),
            status,
            roles: vec![Role::User],
            claims: vec![],
            failed_login_count: 0,
            lockout_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        self.accounts
            .create(&account)
            .await
            .expect("Failed to create account");
        account
    }
}

// Helper to generate unique test email
#[allow(dead_code)]
pub fn test_email() -> String {
    format!("test_{}@example.com", uuid::Uuid::new_v4())
}

// Helper to generate test password
#[allow(dead_code)]
pub fn test_password() -> &'static str {
    "TestPassword123!"
}

// =============================================================================
// INTERLEAVED ACCOUNT STORE
// =============================================================================

/// Delegates to an in-memory store but can hold or interfere with a flow at
/// fixed points, so a race window can be opened on demand.
#[allow(dead_code)]
pub struct InterleavingStore {
    pub inner: Arc<InMemoryAccountStore>,
    token_reads: Option<Barrier>,
    deactivate_after_login: AtomicBool,
}

#[allow(dead_code)]
impl InterleavingStore {
    pub fn new(inner: Arc<InMemoryAccountStore>) -> Self {
        Self {
            inner,
            token_reads: None,
            deactivate_after_login: AtomicBool::new(false),
        }
    }

    /// Every refresh-token read waits until `parties` readers have read.
    pub fn with_token_read_barrier(mut self, parties: usize) -> Self {
        self.token_reads = Some(Barrier::new(parties));
        self
    }

    /// Deactivates the account right after a successful password check.
    pub fn with_deactivation_after_login(self) -> Self {
        self.deactivate_after_login.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl AccountStore for InterleavingStore {
    async fn create(&self, account: &Account) -> StoreResult<()> {
        self.inner.create(account).await
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        self.inner.find_by_email(email).await
    }

    async fn update_status(
        &self,
        account_id: &str,
        from: AccountStatus,
        to: AccountStatus,
    ) -> StoreResult<bool> {
        self.inner.update_status(account_id, from, to).await
    }

    async fn add_role(&self, account_id: &str, role: Role) -> StoreResult<()> {
        self.inner.add_role(account_id, role).await
    }

    async fn delete(&self, account_id: &str) -> StoreResult<bool> {
        self.inner.delete(account_id).await
    }

    async fn record_failed_login(
        &self,
        account_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        self.inner.record_failed_login(account_id, policy, now).await
    }

    async fn record_successful_login(&self, account_id: &str, now: DateTime<Utc>) -> StoreResult<()> {
        self.inner.record_successful_login(account_id, now).await?;
        if self.deactivate_after_login.load(Ordering::SeqCst) {
            self.inner
                .update_status(account_id, AccountStatus::Active, AccountStatus::InActive)
                .await?;
        }
        Ok(())
    }

    async fn clear_lockout(&self, account_id: &str) -> StoreResult<()> {
        self.inner.clear_lockout(account_id).await
    }

    async fn update_password(
        &self,
        account_id: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> StoreResult<bool> {
        self.inner
            .update_password(account_id, expected_hash, new_hash)
            .await
    }

    async fn refresh_token(&self, account_id: &str, provider: &str) -> StoreResult<Option<String>> {
        let value = self.inner.refresh_token(account_id, provider).await?;
        if let Some(barrier) = &self.token_reads {
            barrier.wait().await;
        }
        Ok(value)
    }

    async fn set_refresh_token_if_active(
        &self,
        account_id: &str,
        provider: &str,
        value: &str,
    ) -> StoreResult<bool> {
        self.inner
            .set_refresh_token_if_active(account_id, provider, value)
            .await
    }

    async fn swap_refresh_token(
        &self,
        account_id: &str,
        provider: &str,
        expected: &str,
        replacement: Option<&str>,
    ) -> StoreResult<bool> {
        self.inner
            .swap_refresh_token(account_id, provider, expected, replacement)
            .await
    }

    async fn clear_refresh_tokens(&self, account_id: &str) -> StoreResult<()> {
        self.inner.clear_refresh_tokens(account_id).await
    }
}

// =============================================================================
// REMINDERS
// =============================================================================

#[allow(dead_code)]
pub struct ReminderContext {
    pub store: Arc<InMemoryReminderStore>,
    pub broker: Arc<InMemoryBroker>,
    pub dispatcher: ReminderDispatcher,
    pub poller: ReminderPoller,
}

#[allow(dead_code)]
impl ReminderContext {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryReminderStore::default()))
    }

    pub fn with_store(store: Arc<InMemoryReminderStore>) -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        let dispatcher =
            ReminderDispatcher::new(store.clone(), EventPublisher::new(broker.clone()));
        let config = PollerConfig {
            delay: std::time::Duration::from_millis(10),
            batch_limit: 500,
        };
        let poller = ReminderPoller::new(store.clone(), dispatcher.clone(), &config);

        Self {
            store,
            broker,
            dispatcher,
            poller,
        }
    }

    /// Creates an active task for a fresh owner and returns the owner's email.
    pub async fn add_task(
        &self,
        scheduled_for: DateTime<Utc>,
        offsets: &[ReminderOffset],
    ) -> (String, Task, Vec<Reminder>) {
        let owner_id = uuid::Uuid::new_v4().to_string();
        let email = test_email();
        self.store.register_owner(&owner_id, &email).await;

        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            title: "Prepare slides".to_string(),
            description: Some("Team sync deck".to_string()),
            scheduled_for,
            status: TaskStatus::Active,
        };
        let reminders = self
            .store
            .create_task(&task, offsets)
            .await
            .expect("Failed to create task");

        (email, task, reminders)
    }
}

// =============================================================================
// MAIL
// =============================================================================

#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<NotificationEvent>>,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl RecordingMailer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<NotificationEvent> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, event: &NotificationEvent) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("smtp server unreachable".to_string()));
        }
        self.sent.lock().await.push(event.clone());
        Ok(())
    }
}
