use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use validator::Validate;

use crate::modules::auth::schema::{
    ApiResult, LoginRequest, RefreshTokenRequest, ResultMessage, SignUpRequest, SignUpResponse,
    TokenResponse, VerifySignUpRequest,
};
use crate::services::session::{Registration, SessionError};
use crate::services::token::TokenError;
use crate::AppState;

pub(crate) type Reply<T> = (StatusCode, Json<ApiResult<T>>);

impl TokenError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TokenError::InvalidToken | TokenError::TokenMismatch | TokenError::AccountNotFound => {
                StatusCode::UNAUTHORIZED
            }
            TokenError::AccountNotActive => StatusCode::FORBIDDEN,
            TokenError::Signing(_) | TokenError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing reason; account existence and token-slot state are not distinguished.
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::InvalidToken | TokenError::TokenMismatch | TokenError::AccountNotFound => {
                ResultMessage::INVALID_TOKEN
            }
            TokenError::AccountNotActive => ResultMessage::ACCOUNT_NOT_ACTIVE,
            TokenError::Signing(_) | TokenError::Store(_) => ResultMessage::INTERNAL_ERROR,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            TokenError::InvalidToken => "invalid_token",
            TokenError::AccountNotFound => "account_not_found",
            TokenError::AccountNotActive => "account_not_active",
            TokenError::TokenMismatch => "token_mismatch",
            TokenError::Signing(_) | TokenError::Store(_) => "error",
        }
    }
}

impl SessionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::InvalidCredentials | SessionError::AccountNotFound => {
                StatusCode::UNAUTHORIZED
            }
            SessionError::AccountLocked { .. } => StatusCode::LOCKED,
            SessionError::AccountNotActive => StatusCode::FORBIDDEN,
            SessionError::InvalidTransition { .. }
            | SessionError::RoleAlreadyAssigned(_)
            | SessionError::EmailTaken => StatusCode::CONFLICT,
            SessionError::WeakPassword(_) => StatusCode::BAD_REQUEST,
            SessionError::Token(e) => e.status_code(),
            SessionError::Store(_) | SessionError::Hashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            SessionError::InvalidCredentials | SessionError::AccountNotFound => {
                ResultMessage::INVALID_CREDENTIALS.to_string()
            }
            SessionError::AccountLocked { until } => {
                format!("{} until {}", ResultMessage::ACCOUNT_LOCKED, until.to_rfc3339())
            }
            SessionError::AccountNotActive => ResultMessage::ACCOUNT_NOT_ACTIVE.to_string(),
            SessionError::InvalidTransition { .. }
            | SessionError::RoleAlreadyAssigned(_)
            | SessionError::WeakPassword(_) => self.to_string(),
            SessionError::EmailTaken => ResultMessage::EMAIL_TAKEN.to_string(),
            SessionError::Token(e) => e.reason().to_string(),
            SessionError::Store(_) | SessionError::Hashing(_) => {
                ResultMessage::INTERNAL_ERROR.to_string()
            }
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            SessionError::InvalidCredentials => "invalid_credentials",
            SessionError::AccountNotActive => "account_not_active",
            SessionError::AccountLocked { .. } => "account_locked",
            SessionError::AccountNotFound => "account_not_found",
            SessionError::EmailTaken => "email_taken",
            SessionError::WeakPassword(_) => "weak_password",
            SessionError::Token(e) => e.outcome(),
            _ => "error",
        }
    }
}

/// Logs server-side failures, counts the outcome and builds the error reply.
pub(crate) fn session_failure<T>(
    state: &AppState,
    operation: &'static str,
    message: &str,
    e: SessionError,
) -> Reply<T> {
    if e.status_code().is_server_error() {
        tracing::error!("{} failed: {}", operation, e);
    }
    state.metrics.record_auth(operation, e.outcome());
    (
        e.status_code(),
        Json(ApiResult::failure(message, vec![e.reason()])),
    )
}

pub(crate) fn invalid_request<T>(errors: validator::ValidationErrors) -> Reply<T> {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResult::failure(
            ResultMessage::VALIDATION_FAILED,
            vec![errors.to_string()],
        )),
    )
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Reply<TokenResponse> {
    if let Err(e) = req.validate() {
        return invalid_request(e);
    }

    match state.session.sign_in(&req.email, &req.password).await {
        Ok(signed_in) => {
            state.metrics.record_auth("login", "success");
            (
                StatusCode::OK,
                Json(ApiResult::success(
                    ResultMessage::LOGIN_SUCCEEDED,
                    signed_in.tokens.into(),
                )),
            )
        }
        Err(e) => session_failure(&state, "login", ResultMessage::LOGIN_FAILED, e),
    }
}

pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignUpRequest>,
) -> Reply<SignUpResponse> {
    if let Err(e) = req.validate() {
        return invalid_request(e);
    }

    let registration = Registration {
        email: req.email,
        password: req.password,
        given_name: req.given_name,
        family_name: req.family_name,
    };

    match state.session.sign_up(registration).await {
        Ok(account) => {
            state.metrics.record_auth("signup", "success");
            (
                StatusCode::CREATED,
                Json(ApiResult::success(
                    ResultMessage::SIGN_UP_SUCCESS,
                    SignUpResponse {
                        account_id: account.id,
                        email: account.email,
                    },
                )),
            )
        }
        Err(e) => session_failure(&state, "signup", ResultMessage::SIGN_UP_FAILED, e),
    }
}

pub async fn verify_sign_up(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifySignUpRequest>,
) -> Reply<()> {
    if let Err(e) = req.validate() {
        return invalid_request(e);
    }

    match state.session.confirm_signup(&req.account_id, &req.token).await {
        Ok(_) => {
            state.metrics.record_auth("signup_verify", "success");
            (
                StatusCode::OK,
                Json(ApiResult::success(ResultMessage::ACTIVATE_ACCOUNT_SUCCESS, ())),
            )
        }
        Err(e) => session_failure(
            &state,
            "signup_verify",
            ResultMessage::ACTIVATE_ACCOUNT_FAILED,
            e,
        ),
    }
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Reply<TokenResponse> {
    if let Err(e) = req.validate() {
        return invalid_request(e);
    }

    match state.tokens.refresh_token(&req.refresh_token).await {
        Ok(pair) => {
            state.metrics.record_auth("refresh", "success");
            (
                StatusCode::OK,
                Json(ApiResult::success(ResultMessage::TOKEN_REFRESHED, pair.into())),
            )
        }
        Err(e) => {
            if e.status_code().is_server_error() {
                tracing::error!("Token refresh failed: {}", e);
            }
            state.metrics.record_auth("refresh", e.outcome());
            (
                e.status_code(),
                Json(ApiResult::failure(
                    ResultMessage::TOKEN_REFRESH_FAILED,
                    vec![e.reason().to_string()],
                )),
            )
        }
    }
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Reply<()> {
    if let Err(e) = req.validate() {
        return invalid_request(e);
    }

    match state.tokens.revoke_token(&req.refresh_token).await {
        Ok(()) => {
            state.metrics.record_auth("revoke", "success");
            (
                StatusCode::OK,
                Json(ApiResult::success(ResultMessage::TOKEN_REVOKED, ())),
            )
        }
        Err(e) => {
            if e.status_code().is_server_error() {
                tracing::error!("Token revoke failed: {}", e);
            }
            state.metrics.record_auth("revoke", e.outcome());
            (
                e.status_code(),
                Json(ApiResult::failure(
                    ResultMessage::TOKEN_REVOKE_FAILED,
                    vec![e.reason().to_string()],
                )),
            )
        }
    }
}
