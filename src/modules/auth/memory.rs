use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::interface::{AccountStore, Result};
use super::model::{Account, AccountStatus, Role};
use crate::config::LockoutPolicy;
use crate::modules::StoreError;

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    tokens: HashMap<(String, String), String>,
}

/// Process-local account store. Every read-modify-write happens under one write
/// lock, so the refresh-token swap is atomic.
#[derive(Default)]
pub struct InMemoryAccountStore {
    state: RwLock<State>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create(&self, account: &Account) -> Result<()> {
        let mut state = self.state.write().await;
        if state.accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict(format!(
                "email {} is already registered",
                account.email
            )));
        }
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.state.read().await.accounts.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self
            .state
            .read()
            .await
            .accounts
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn update_status(
        &self,
        account_id: &str,
        from: AccountStatus,
        to: AccountStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.accounts.get_mut(account_id) {
            Some(account) if account.status == from => {
                account.status = to;
                account.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn add_role(&self, account_id: &str, role: Role) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(account) = state.accounts.get_mut(account_id) {
            if !account.roles.contains(&role) {
                account.roles.push(role);
                account.roles.sort();
            }
        }
        Ok(())
    }

    async fn delete(&self, account_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.tokens.retain(|(id, _), _| id != account_id);
        Ok(state.accounts.remove(account_id).is_some())
    }

    async fn record_failed_login(
        &self,
        account_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut state = self.state.write().await;
        let Some(account) = state.accounts.get_mut(account_id) else {
            return Ok(None);
        };

        account.failed_login_count += 1;
        if account.failed_login_count >= policy.max_failed_attempts {
            account.failed_login_count = 0;
            account.lockout_until = Some(now + policy.lockout_duration);
        }

        Ok(account.lockout_until.filter(|until| *until > now))
    }

    async fn record_successful_login(&self, account_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(account) = state.accounts.get_mut(account_id) {
            account.failed_login_count = 0;
            account.lockout_until = None;
            account.last_login_at = Some(now);
        }
        Ok(())
    }

    async fn clear_lockout(&self, account_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(account) = state.accounts.get_mut(account_id) {
            account.failed_login_count = 0;
            account.lockout_until = None;
        }
        Ok(())
    }

    async fn update_password(
        &self,
        account_id: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.accounts.get_mut(account_id) {
            Some(account) if account.password_hash == expected_hash => {
                account.password_hash = new_hash.to_string();
                account.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn refresh_token(&self, account_id: &str, provider: &str) -> Result<Option<String>> {
        let key = (account_id.to_string(), provider.to_string());
        Ok(self.state.read().await.tokens.get(&key).cloned())
    }

    async fn set_refresh_token_if_active(
        &self,
        account_id: &str,
        provider: &str,
        value: &str,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let active = state
            .accounts
            .get(account_id)
            .is_some_and(|a| a.status == AccountStatus::Active);
        if !active {
            return Ok(false);
        }

        let key = (account_id.to_string(), provider.to_string());
        state.tokens.insert(key, value.to_string());
        Ok(true)
    }

    async fn swap_refresh_token(
        &self,
        account_id: &str,
        provider: &str,
        expected: &str,
        replacement: Option<&str>,
    ) -> Result<bool> {
        let key = (account_id.to_string(), provider.to_string());
        let mut state = self.state.write().await;

        if state.tokens.get(&key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }

        match replacement {
            Some(next) => {
                state.tokens.insert(key, next.to_string());
            }
            None => {
                state.tokens.remove(&key);
            }
        }
        Ok(true)
    }

    async fn clear_refresh_tokens(&self, account_id: &str) -> Result<()> {
        self.state
            .write()
            .await
            .tokens
            .retain(|(id, _), _| id != account_id);
        Ok(())
    }
}
