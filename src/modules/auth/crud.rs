use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};

use super::interface::{AccountStore, Result};
use super::model::{Account, AccountRow, AccountStatus, Role, UserClaim};
use crate::config::LockoutPolicy;
use crate::modules::StoreError;

pub struct MySqlAccountStore {
    pool: Pool<MySql>,
}

impl MySqlAccountStore {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: AccountRow) -> Result<Account> {
        let status = AccountStatus::from_i8(row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("account {} has unknown status {}", row.id, row.status))
        })?;

        let role_names: Vec<(String,)> =
            sqlx::query_as("SELECT role FROM account_roles WHERE account_id = ? ORDER BY role")
                .bind(&row.id)
                .fetch_all(&self.pool)
                .await?;

        let claims: Vec<(String, String)> = sqlx::query_as(
            "SELECT claim_type, claim_value FROM account_claims WHERE account_id = ?",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let roles = role_names
            .into_iter()
            .filter_map(|(name,)| {
                let role = Role::parse(&name);
                if role.is_none() {
                    tracing::warn!("Ignoring unknown role {} on account {}", name, row.id);
                }
                role
            })
            .collect();

        Ok(Account {
            id: row.id,
            email: row.email,
            given_name: row.given_name,
            family_name: row.family_name,
            password_hash: row.password_hash,
            status,
            roles,
            claims: claims
                .into_iter()
                .map(|(claim_type, value)| UserClaim { claim_type, value })
                .collect(),
            failed_login_count: row.failed_login_count.max(0) as u32,
            lockout_until: row.lockout_until,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl AccountStore for MySqlAccountStore {
    async fn create(&self, account: &Account) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, given_name, family_name, password_hash, status,
                                  failed_login_count, lockout_until, last_login_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.email)
        .bind(&account.given_name)
        .bind(&account.family_name)
        .bind(&account.password_hash)
        .bind(account.status.as_i8())
        .bind(account.failed_login_count as i32)
        .bind(account.lockout_until)
        .bind(account.last_login_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(
                format!("email {} is already registered", account.email),
            ),
            other => StoreError::Database(other),
        })?;

        for role in &account.roles {
            sqlx::query("INSERT INTO account_roles (account_id, role) VALUES (?, ?)")
                .bind(&account.id)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await?;
        }

        for claim in &account.claims {
            sqlx::query(
                "INSERT INTO account_claims (account_id, claim_type, claim_value) VALUES (?, ?, ?)",
            )
            .bind(&account.id)
            .bind(&claim.claim_type)
            .bind(&claim.value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        account_id: &str,
        from: AccountStatus,
        to: AccountStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_i8())
            .bind(account_id)
            .bind(from.as_i8())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn add_role(&self, account_id: &str, role: Role) -> Result<()> {
        sqlx::query("INSERT IGNORE INTO account_roles (account_id, role) VALUES (?, ?)")
            .bind(account_id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, account_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_failed_login(
        &self,
        account_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let max_attempts = policy.max_failed_attempts as i32;
        let lockout_until = now + policy.lockout_duration;

        let mut tx = self.pool.begin().await?;

        // MySQL evaluates SET clauses left to right, so `lockout_until` still sees
        // the old counter.
        sqlx::query(
            r#"
            UPDATE accounts
            SET lockout_until = IF(failed_login_count + 1 >= ?, ?, lockout_until),
                failed_login_count = IF(failed_login_count + 1 >= ?, 0, failed_login_count + 1)
            WHERE id = ?
            "#,
        )
        .bind(max_attempts)
        .bind(lockout_until)
        .bind(max_attempts)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        let (stored,): (Option<DateTime<Utc>>,) =
            sqlx::query_as("SELECT lockout_until FROM accounts WHERE id = ?")
                .bind(account_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(stored.filter(|until| *until > now))
    }

    async fn record_successful_login(&self, account_id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET failed_login_count = 0, lockout_until = NULL, last_login_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_lockout(&self, account_id: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET failed_login_count = 0, lockout_until = NULL WHERE id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_password(
        &self,
        account_id: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE accounts SET password_hash = ? WHERE id = ? AND password_hash = ?")
                .bind(new_hash)
                .bind(account_id)
                .bind(expected_hash)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn refresh_token(&self, account_id: &str, provider: &str) -> Result<Option<String>> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM account_tokens WHERE account_id = ? AND provider = ?")
                .bind(account_id)
                .bind(provider)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.map(|(value,)| value))
    }

    async fn set_refresh_token_if_active(
        &self,
        account_id: &str,
        provider: &str,
        value: &str,
    ) -> Result<bool> {
        // The status filter and the write are one statement, so a concurrent
        // deactivation either lands first (no row selected) or clears the token after.
        let result = sqlx::query(
            r#"
            INSERT INTO account_tokens (account_id, provider, value)
            SELECT id, ?, ? FROM accounts WHERE id = ? AND status = ?
            ON DUPLICATE KEY UPDATE value = VALUES(value)
            "#,
        )
        .bind(provider)
        .bind(value)
        .bind(account_id)
        .bind(AccountStatus::Active.as_i8())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn swap_refresh_token(
        &self,
        account_id: &str,
        provider: &str,
        expected: &str,
        replacement: Option<&str>,
    ) -> Result<bool> {
        let result = match replacement {
            Some(next) => {
                sqlx::query(
                    "UPDATE account_tokens SET value = ? WHERE account_id = ? AND provider = ? AND value = ?",
                )
                .bind(next)
                .bind(account_id)
                .bind(provider)
                .bind(expected)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "DELETE FROM account_tokens WHERE account_id = ? AND provider = ? AND value = ?",
                )
                .bind(account_id)
                .bind(provider)
                .bind(expected)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn clear_refresh_tokens(&self, account_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM account_tokens WHERE account_id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
