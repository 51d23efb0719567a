use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use validator::Validate;

use super::schema::{ChangePasswordRequest, InitiatePasswordResetRequest, ResetPasswordRequest};
use crate::modules::auth::controller::{invalid_request, session_failure, Reply};
use crate::modules::auth::schema::{ApiResult, ResultMessage};
use crate::modules::auth::AuthenticatedAccount;
use crate::AppState;

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedAccount,
    Json(req): Json<ChangePasswordRequest>,
) -> Reply<()> {
    if let Err(e) = req.validate() {
        return invalid_request(e);
    }

    match state
        .session
        .change_password(&caller.account_id, &req.current_password, &req.new_password)
        .await
    {
        Ok(()) => {
            state.metrics.record_auth("change_password", "success");
            (
                StatusCode::OK,
                Json(ApiResult::success(ResultMessage::CHANGE_PASSWORD_SUCCESS, ())),
            )
        }
        Err(e) => session_failure(
            &state,
            "change_password",
            ResultMessage::CHANGE_PASSWORD_FAILED,
            e,
        ),
    }
}

/// Always answers with the same success message whether or not the email exists.
pub async fn initiate_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InitiatePasswordResetRequest>,
) -> Reply<()> {
    if let Err(e) = req.validate() {
        return invalid_request(e);
    }

    match state.session.initiate_password_reset(&req.email).await {
        Ok(()) => {
            state.metrics.record_auth("password_reset_initial", "success");
            (
                StatusCode::OK,
                Json(ApiResult::success(ResultMessage::FORGOT_PASSWORD_SUCCESS, ())),
            )
        }
        Err(e) => session_failure(
            &state,
            "password_reset_initial",
            ResultMessage::RESET_PASSWORD_FAILED,
            e,
        ),
    }
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Reply<()> {
    if let Err(e) = req.validate() {
        return invalid_request(e);
    }

    match state
        .session
        .reset_password(&req.account_id, &req.token, &req.new_password)
        .await
    {
        Ok(()) => {
            state.metrics.record_auth("password_reset", "success");
            (
                StatusCode::OK,
                Json(ApiResult::success(ResultMessage::RESET_PASSWORD_SUCCESS, ())),
            )
        }
        Err(e) => session_failure(
            &state,
            "password_reset",
            ResultMessage::RESET_PASSWORD_FAILED,
            e,
        ),
    }
}
