use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

use crate::config::TokenConfig;
use crate::modules::auth::interface::REFRESH_TOKEN_PROVIDER;
use crate::modules::auth::{Account, AccountStore, Role, UserClaim};
use crate::modules::StoreError;
use crate::services::jwt::{AccessClaims, JwtService};
use crate::services::protector::TokenProtector;
use crate::services::session;

const REFRESH_TOKEN_PURPOSE: &str = "RefreshToken";
const EMAIL_CONFIRMATION_PURPOSE: &str = "EmailConfirmation";
const PASSWORD_RESET_PURPOSE: &str = "ResetPassword";
const REFRESH_TOKEN_BYTES: usize = 64;
const PASSWORD_STAMP_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Account is not active")]
    AccountNotActive,
    #[error("Refresh token does not match the stored token")]
    TokenMismatch,
    #[error("Failed to sign token: {0}")]
    Signing(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Issues, rotates and revokes bearer credentials.
///
/// An account holds at most one refresh token. Rotation and revocation only
/// succeed against the exact value currently stored, so a refresh token can be
/// redeemed once.
pub struct TokenService {
    accounts: Arc<dyn AccountStore>,
    jwt: JwtService,
    protector: TokenProtector,
    activation: TokenProtector,
    password_reset: TokenProtector,
}

impl TokenService {
    pub fn new(accounts: Arc<dyn AccountStore>, config: &TokenConfig) -> Self {
        Self {
            accounts,
            jwt: JwtService::new(config),
            protector: TokenProtector::new(
                &config.secret,
                REFRESH_TOKEN_PURPOSE,
                config.refresh_token_lifetime,
            ),
            activation: TokenProtector::new(
                &config.secret,
                EMAIL_CONFIRMATION_PURPOSE,
                config.activation_token_lifetime,
            ),
            password_reset: TokenProtector::new(
                &config.secret,
                PASSWORD_RESET_PURPOSE,
                config.password_reset_token_lifetime,
            ),
        }
    }

    pub fn issue_token(
        &self,
        account: &Account,
        claims: &[UserClaim],
        roles: &[Role],
    ) -> Result<TokenPair, TokenError> {
        let access_token = self
            .jwt
            .create_access_token(account, claims, roles, Utc::now())
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        let mut random = [0u8; REFRESH_TOKEN_BYTES];
        rand::rng().fill_bytes(&mut random);
        let plaintext = format!("{}|{}", STANDARD.encode(random), account.id);

        let refresh_token = self
            .protector
            .protect(&plaintext)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.jwt.get_access_token_duration_secs(),
        })
    }

    /// Opens a protected refresh token and returns the account id it belongs to.
    pub fn unwrap_refresh_token(&self, protected: &str) -> Result<String, TokenError> {
        let plaintext = self.protector.unprotect(protected).map_err(|e| {
            tracing::debug!("Refresh token rejected: {}", e);
            TokenError::InvalidToken
        })?;

        match plaintext.split_once('|') {
            Some((random, account_id)) if !random.is_empty() && !account_id.is_empty() => {
                Ok(account_id.to_string())
            }
            _ => Err(TokenError::InvalidToken),
        }
    }

    /// Makes `pair` the account's only valid refresh token, replacing any prior one.
    /// Fails with `AccountNotActive` if the account left `Active` since it was loaded.
    pub async fn store_issued(&self, account_id: &str, pair: &TokenPair) -> Result<(), TokenError> {
        let stored = self
            .accounts
            .set_refresh_token_if_active(account_id, REFRESH_TOKEN_PROVIDER, &pair.refresh_token)
            .await?;

        if !stored {
            tracing::warn!("Account {} left Active before its refresh token was stored", account_id);
            return Err(TokenError::AccountNotActive);
        }
        Ok(())
    }

    pub async fn refresh_token(&self, protected: &str) -> Result<TokenPair, TokenError> {
        let account = self.load_presented(protected).await?;

        session::ensure_active(&account).map_err(|_| TokenError::AccountNotActive)?;

        self.check_stored(&account.id, protected).await?;

        let pair = self.issue_token(&account, &account.claims, &account.roles)?;

        let swapped = self
            .accounts
            .swap_refresh_token(
                &account.id,
                REFRESH_TOKEN_PROVIDER,
                protected,
                Some(&pair.refresh_token),
            )
            .await?;

        if !swapped {
            tracing::warn!("Concurrent refresh lost the swap for account {}", account.id);
            return Err(TokenError::TokenMismatch);
        }

        tracing::debug!("Rotated refresh token for account {}", account.id);
        Ok(pair)
    }

    /// Clears the stored refresh token. Does not require the account to be active.
    pub async fn revoke_token(&self, protected: &str) -> Result<(), TokenError> {
        let account = self.load_presented(protected).await?;

        self.check_stored(&account.id, protected).await?;

        let cleared = self
            .accounts
            .swap_refresh_token(&account.id, REFRESH_TOKEN_PROVIDER, protected, None)
            .await?;

        if !cleared {
            return Err(TokenError::TokenMismatch);
        }

        tracing::debug!("Revoked refresh token for account {}", account.id);
        Ok(())
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.jwt
            .verify_access_token(token)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Access token rejected: {}", e);
                TokenError::InvalidToken
            })
    }

    // -------------------------------------------------------------------------
    // One-time account tokens
    // -------------------------------------------------------------------------

    /// Token mailed on sign-up; it only confirms the account it was issued for.
    pub fn issue_activation_token(&self, account: &Account) -> Result<String, TokenError> {
        self.activation
            .protect(&account.id)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify_activation_token(&self, account_id: &str, token: &str) -> Result<(), TokenError> {
        let bound = self.activation.unprotect(token).map_err(|e| {
            tracing::debug!("Activation token rejected: {}", e);
            TokenError::InvalidToken
        })?;

        if bound != account_id {
            return Err(TokenError::InvalidToken);
        }
        Ok(())
    }

    /// The token carries a fingerprint of the current password hash, so it stops
    /// opening once the password has changed.
    pub fn issue_password_reset_token(&self, account: &Account) -> Result<String, TokenError> {
        let plaintext = format!("{}|{}", account.id, password_stamp(&account.password_hash));
        self.password_reset
            .protect(&plaintext)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify_password_reset_token(
        &self,
        account: &Account,
        token: &str,
    ) -> Result<(), TokenError> {
        let plaintext = self.password_reset.unprotect(token).map_err(|e| {
            tracing::debug!("Password reset token rejected: {}", e);
            TokenError::InvalidToken
        })?;

        match plaintext.split_once('|') {
            Some((account_id, stamp))
                if account_id == account.id && stamp == password_stamp(&account.password_hash) =>
            {
                Ok(())
            }
            _ => Err(TokenError::InvalidToken),
        }
    }

    async fn load_presented(&self, protected: &str) -> Result<Account, TokenError> {
        let account_id = self.unwrap_refresh_token(protected)?;

        self.accounts
            .find_by_id(&account_id)
            .await?
            .ok_or(TokenError::AccountNotFound)
    }

    async fn check_stored(&self, account_id: &str, protected: &str) -> Result<(), TokenError> {
        let stored = self
            .accounts
            .refresh_token(account_id, REFRESH_TOKEN_PROVIDER)
            .await?;

        if stored.as_deref() != Some(protected) {
            return Err(TokenError::TokenMismatch);
        }
        Ok(())
    }
}

fn password_stamp(password_hash: &str) -> String {
    let digest = Sha256::digest(password_hash.as_bytes());
    STANDARD.encode(&digest[..PASSWORD_STAMP_BYTES])
}
