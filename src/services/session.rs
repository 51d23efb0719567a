use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::config::LockoutPolicy;
use crate::modules::auth::{Account, AccountStatus, AccountStore, Role, UserClaim};
use crate::modules::StoreError;
use crate::services::hashing;
use crate::services::notification::{EventPublisher, NotificationEvent, NotificationType};
use crate::services::token::{TokenError, TokenPair, TokenService};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is not active")]
    AccountNotActive,
    #[error("Account is locked until {until}")]
    AccountLocked { until: DateTime<Utc> },
    #[error("Account not found")]
    AccountNotFound,
    #[error("Cannot move account from {from} to {to}")]
    InvalidTransition { from: AccountStatus, to: AccountStatus },
    #[error("Role {0:?} is already assigned")]
    RoleAlreadyAssigned(Role),
    #[error("Email is already registered")]
    EmailTaken,
    #[error("{0}")]
    WeakPassword(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Hashing error: {0}")]
    Hashing(String),
}

pub fn ensure_active(account: &Account) -> Result<(), SessionError> {
    if account.status == AccountStatus::Active {
        Ok(())
    } else {
        Err(SessionError::AccountNotActive)
    }
}

pub struct SignIn {
    pub account: Account,
    pub tokens: TokenPair,
}

/// Details supplied when an account is created.
pub struct Registration {
    pub email: String,
    pub password: String,
    pub given_name: String,
    pub family_name: String,
}

fn check_password_policy(password: &str) -> Result<(), SessionError> {
    let violations = hashing::password_policy_violations(password);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(SessionError::WeakPassword(violations.join("; ")))
    }
}

/// Account-status gate in front of credential issuance, plus the lifecycle
/// transitions that move an account between states.
pub struct SessionGate {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<TokenService>,
    publisher: EventPublisher,
    lockout: LockoutPolicy,
}

impl SessionGate {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<TokenService>,
        publisher: EventPublisher,
        lockout: LockoutPolicy,
    ) -> Self {
        Self {
            accounts,
            tokens,
            publisher,
            lockout,
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn, SessionError> {
        let account = self
            .accounts
            .find_by_email(email)
            .await?
            .ok_or(SessionError::InvalidCredentials)?;

        ensure_active(&account)?;

        let now = Utc::now();
        if let Some(until) = account.lockout_until.filter(|until| *until > now) {
            return Err(SessionError::AccountLocked { until });
        }

        let valid = hashing::verify_password(password, &account.password_hash)
            .map_err(|e| SessionError::Hashing(e.to_string()))?;

        if !valid {
            let locked = self
                .accounts
                .record_failed_login(&account.id, &self.lockout, now)
                .await?;

            return match locked {
                Some(until) => {
                    tracing::warn!("Account {} locked until {}", account.id, until);
                    self.notify(&account, NotificationType::SignInBlockedAccount)
                        .await;
                    Err(SessionError::AccountLocked { until })
                }
                None => Err(SessionError::InvalidCredentials),
            };
        }

        self.accounts
            .record_successful_login(&account.id, now)
            .await?;

        let tokens = self
            .tokens
            .issue_token(&account, &account.claims, &account.roles)?;
        self.tokens
            .store_issued(&account.id, &tokens)
            .await
            .map_err(|e| match e {
                TokenError::AccountNotActive => SessionError::AccountNotActive,
                other => other.into(),
            })?;

        tracing::info!("Account {} signed in", account.id);
        self.notify(&account, NotificationType::SignInSuccess).await;

        Ok(SignIn { account, tokens })
    }

    /// Creates a `Pending` account and mails its activation token.
    pub async fn sign_up(&self, registration: Registration) -> Result<Account, SessionError> {
        check_password_policy(&registration.password)?;

        let password_hash = hashing::hash_password(&registration.password)
            .map_err(|e| SessionError::Hashing(e.to_string()))?;

        let now = Utc::now();
        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            email: registration.email,
            given_name: registration.given_name,
            family_name: registration.family_name,
            password_hash,
            status: AccountStatus::Pending,
            roles: vec![Role::User],
            claims: vec![UserClaim::new("Permission", "CanView")],
            failed_login_count: 0,
            lockout_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        match self.accounts.create(&account).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(SessionError::EmailTaken),
            Err(e) => return Err(e.into()),
        }

        let token = self.tokens.issue_activation_token(&account)?;

        tracing::info!("Account {} signed up", account.id);
        let event = NotificationEvent::new(&account.email, NotificationType::SignUpActivation)
            .with_replacement("{{FirstName}}", &account.given_name)
            .with_replacement("{{token}}", token)
            .with_replacement("{{userid}}", &account.id);
        self.publisher.publish_best_effort(event).await;

        Ok(account)
    }

    /// Pending -> Active once the mailed activation token is presented.
    pub async fn confirm_signup(
        &self,
        account_id: &str,
        activation_token: &str,
    ) -> Result<Account, SessionError> {
        self.tokens
            .verify_activation_token(account_id, activation_token)?;

        let account = self
            .transition_from(account_id, &[AccountStatus::Pending], AccountStatus::Active)
            .await?;
        self.notify(&account, NotificationType::SignUpCompleted).await;
        Ok(account)
    }

    /// InActive -> Active, performed by an administrator.
    pub async fn activate(&self, account_id: &str) -> Result<Account, SessionError> {
        let account = self
            .transition_from(account_id, &[AccountStatus::InActive], AccountStatus::Active)
            .await?;
        self.notify(&account, NotificationType::AccountActivationAdmin)
            .await;
        Ok(account)
    }

    pub async fn deactivate(&self, account_id: &str) -> Result<Account, SessionError> {
        let account = self
            .transition_from(account_id, &[AccountStatus::Active], AccountStatus::InActive)
            .await?;
        self.notify(&account, NotificationType::DeactivateAccountSuccess)
            .await;
        Ok(account)
    }

    /// Soft delete moves the account to `Deleted`; permanent delete removes it.
    pub async fn delete(&self, account_id: &str, permanent: bool) -> Result<(), SessionError> {
        let account = if permanent {
            let account = self.load(account_id).await?;
            self.accounts.clear_refresh_tokens(account_id).await?;
            if !self.accounts.delete(account_id).await? {
                return Err(SessionError::AccountNotFound);
            }
            account
        } else {
            self.transition_from(
                account_id,
                &[
                    AccountStatus::Pending,
                    AccountStatus::Active,
                    AccountStatus::InActive,
                ],
                AccountStatus::Deleted,
            )
            .await?
        };

        tracing::info!(permanent, "Deleted account {}", account_id);
        self.notify(&account, NotificationType::DeleteAccountSuccess)
            .await;
        Ok(())
    }

    pub async fn change_role(&self, account_id: &str, role: Role) -> Result<Account, SessionError> {
        let mut account = self.load(account_id).await?;
        ensure_active(&account)?;

        if account.roles.contains(&role) {
            return Err(SessionError::RoleAlreadyAssigned(role));
        }

        self.accounts.add_role(account_id, role).await?;
        account.roles.push(role);
        account.roles.sort();

        let event = NotificationEvent::new(&account.email, NotificationType::ChangeRoleSuccess)
            .with_replacement("{{FirstName}}", &account.given_name)
            .with_replacement("{{Role}}", role.as_str());
        self.publisher.publish_best_effort(event).await;

        Ok(account)
    }

    /// Requires the current password. Outstanding refresh tokens are revoked.
    pub async fn change_password(
        &self,
        account_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        let account = self.load(account_id).await?;
        ensure_active(&account)?;

        let valid = hashing::verify_password(current_password, &account.password_hash)
            .map_err(|e| SessionError::Hashing(e.to_string()))?;
        if !valid {
            return Err(SessionError::InvalidCredentials);
        }

        if !self.replace_password(&account, new_password).await? {
            return Err(SessionError::InvalidCredentials);
        }
        self.accounts.clear_refresh_tokens(&account.id).await?;

        tracing::info!("Account {} changed its password", account.id);
        self.notify(&account, NotificationType::ChangePasswordSuccess)
            .await;
        Ok(())
    }

    /// Mails a reset token to an `Active` account. Unknown or non-active emails
    /// succeed silently so the response does not reveal which accounts exist.
    pub async fn initiate_password_reset(&self, email: &str) -> Result<(), SessionError> {
        let Some(account) = self.accounts.find_by_email(email).await? else {
            tracing::debug!("Password reset requested for an unknown email");
            return Ok(());
        };

        if account.status != AccountStatus::Active {
            tracing::debug!("Password reset requested for {} account {}", account.status, account.id);
            return Ok(());
        }

        let token = self.tokens.issue_password_reset_token(&account)?;

        let event = NotificationEvent::new(&account.email, NotificationType::PasswordResetInitiation)
            .with_replacement("{{FirstName}}", &account.given_name)
            .with_replacement("{{token}}", token)
            .with_replacement("{{userid}}", &account.id);
        self.publisher.publish_best_effort(event).await;
        Ok(())
    }

    /// Sets a new password from a reset token and lifts any lockout. The token
    /// is spent by the password change itself.
    pub async fn reset_password(
        &self,
        account_id: &str,
        reset_token: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(SessionError::Token(TokenError::InvalidToken))?;

        self.tokens
            .verify_password_reset_token(&account, reset_token)?;
        ensure_active(&account)?;

        if !self.replace_password(&account, new_password).await? {
            return Err(SessionError::Token(TokenError::InvalidToken));
        }
        self.accounts.clear_lockout(&account.id).await?;
        self.accounts.clear_refresh_tokens(&account.id).await?;

        tracing::info!("Account {} reset its password", account.id);
        self.notify(&account, NotificationType::PasswordResetSuccess)
            .await;
        Ok(())
    }

    /// `false` if the stored hash changed since `account` was loaded.
    async fn replace_password(
        &self,
        account: &Account,
        new_password: &str,
    ) -> Result<bool, SessionError> {
        check_password_policy(new_password)?;

        let new_hash = hashing::hash_password(new_password)
            .map_err(|e| SessionError::Hashing(e.to_string()))?;

        Ok(self
            .accounts
            .update_password(&account.id, &account.password_hash, &new_hash)
            .await?)
    }

    async fn load(&self, account_id: &str) -> Result<Account, SessionError> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or(SessionError::AccountNotFound)
    }

    async fn transition_from(
        &self,
        account_id: &str,
        allowed: &[AccountStatus],
        to: AccountStatus,
    ) -> Result<Account, SessionError> {
        let mut account = self.load(account_id).await?;
        let from = account.status;

        if !allowed.contains(&from) || !from.can_transition_to(to) {
            return Err(SessionError::InvalidTransition { from, to });
        }

        if !self.accounts.update_status(account_id, from, to).await? {
            // Someone else moved the account first.
            let current = self.load(account_id).await?.status;
            return Err(SessionError::InvalidTransition { from: current, to });
        }

        if from == AccountStatus::Active {
            self.accounts.clear_refresh_tokens(account_id).await?;
        }

        tracing::info!("Account {} moved from {} to {}", account_id, from, to);
        account.status = to;
        Ok(account)
    }

    async fn notify(&self, account: &Account, notification_type: NotificationType) {
        let event = NotificationEvent::new(&account.email, notification_type)
            .with_replacement("{{FirstName}}", &account.given_name);
        self.publisher.publish_best_effort(event).await;
    }
}
