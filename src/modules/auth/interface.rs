use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{Account, AccountStatus, Role};
use crate::config::LockoutPolicy;
use crate::modules::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Provider name under which the refresh token is stored.
pub const REFRESH_TOKEN_PROVIDER: &str = "TaskTracker";

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Persistence contract for accounts.
///
/// `find_*` returns `None` only when the row does not exist; a soft-deleted
/// account is returned with `AccountStatus::Deleted`.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `StoreError::Conflict` if the email is already registered.
    async fn create(&self, account: &Account) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Account>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Conditionally moves `from -> to`. Returns `false` if the stored status
    /// was no longer `from`.
    async fn update_status(
        &self,
        account_id: &str,
        from: AccountStatus,
        to: AccountStatus,
    ) -> Result<bool>;

    async fn add_role(&self, account_id: &str, role: Role) -> Result<()>;

    /// Physically removes the account. Returns `false` if it did not exist.
    async fn delete(&self, account_id: &str) -> Result<bool>;

    /// Counts a failed password attempt. Once the policy's maximum is reached the
    /// counter resets and the account is locked; the new lockout end is returned.
    async fn record_failed_login(
        &self,
        account_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn record_successful_login(&self, account_id: &str, now: DateTime<Utc>) -> Result<()>;

    /// Resets the failed-login counter and lifts any lockout.
    async fn clear_lockout(&self, account_id: &str) -> Result<()>;

    /// Replaces the password hash only if the stored hash is still `expected_hash`.
    async fn update_password(
        &self,
        account_id: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool>;

    // -------------------------------------------------------------------------
    // Refresh token slot (one value per account and provider)
    // -------------------------------------------------------------------------

    async fn refresh_token(&self, account_id: &str, provider: &str) -> Result<Option<String>>;

    /// Replaces the stored value in the same step that checks the account is
    /// `Active`. Returns `false` and writes nothing otherwise.
    async fn set_refresh_token_if_active(
        &self,
        account_id: &str,
        provider: &str,
        value: &str,
    ) -> Result<bool>;

    /// Compare-and-swap on the stored value: only succeeds if the slot still holds
    /// exactly `expected`. `replacement = None` clears the slot.
    async fn swap_refresh_token(
        &self,
        account_id: &str,
        provider: &str,
        expected: &str,
        replacement: Option<&str>,
    ) -> Result<bool>;

    async fn clear_refresh_tokens(&self, account_id: &str) -> Result<()>;
}
