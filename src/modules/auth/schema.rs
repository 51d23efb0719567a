use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::token::TokenPair;

// =============================================================================
// RESPONSE ENVELOPE
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub succeeded: bool,
    pub message: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResult<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
            errors: Vec::new(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            errors,
            data: None,
        }
    }
}

pub struct ResultMessage;

impl ResultMessage {
    pub const LOGIN_SUCCEEDED: &'static str = "Login succeeded.";
    pub const LOGIN_FAILED: &'static str = "Login failed.";
    pub const TOKEN_REFRESHED: &'static str = "Token refreshed.";
    pub const TOKEN_REFRESH_FAILED: &'static str = "Token refresh failed.";
    pub const TOKEN_REVOKED: &'static str = "Token revoked.";
    pub const TOKEN_REVOKE_FAILED: &'static str = "Token revoke failed.";
    pub const VALIDATION_FAILED: &'static str = "Validation failed.";
    pub const UNAUTHORIZED: &'static str = "Unauthorized.";
    pub const SIGN_UP_SUCCESS: &'static str = "Sign up successful.";
    pub const SIGN_UP_FAILED: &'static str = "Sign up failed. Please review errors and try again.";
    pub const ACTIVATE_ACCOUNT_SUCCESS: &'static str = "Account activated successfully.";
    pub const ACTIVATE_ACCOUNT_FAILED: &'static str = "Account activation failed.";
    pub const CHANGE_PASSWORD_SUCCESS: &'static str = "Your password was changed successfully.";
    pub const CHANGE_PASSWORD_FAILED: &'static str = "You cannot change password at this time.";
    pub const FORGOT_PASSWORD_SUCCESS: &'static str =
        "Password reset requested. Please check your mail";
    pub const RESET_PASSWORD_SUCCESS: &'static str =
        "Password reset successful. Please reattempt login with new password.";
    pub const RESET_PASSWORD_FAILED: &'static str =
        "We could not reset password at this time. Please try again later";

    pub const INVALID_CREDENTIALS: &'static str = "Invalid email or password";
    pub const ACCOUNT_LOCKED: &'static str = "Account is locked";
    pub const ACCOUNT_NOT_ACTIVE: &'static str = "Account is not active";
    pub const INVALID_TOKEN: &'static str = "Invalid token";
    pub const EMAIL_TAKEN: &'static str = "Email is already registered";
    pub const INTERNAL_ERROR: &'static str = "An unexpected error occurred";
}

// =============================================================================
// LOGIN
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
        }
    }
}

// =============================================================================
// SIGN UP
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 12, message = "Password must be at least 12 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
    #[validate(length(min = 1, max = 100, message = "Given name is required"))]
    pub given_name: String,
    #[validate(length(min = 1, max = 100, message = "Family name is required"))]
    pub family_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpResponse {
    pub account_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifySignUpRequest {
    #[validate(length(min = 1, message = "Account id is required"))]
    pub account_id: String,
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

// =============================================================================
// REFRESH / REVOKE
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}
