use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::modules::auth::schema::{ApiResult, ResultMessage};
use crate::AppState;

/// Caller identified by a valid `Authorization: Bearer <access token>` header.
///
/// ```rust,ignore
/// pub async fn change_password(
///     State(state): State<Arc<AppState>>,
///     caller: AuthenticatedAccount,
///     Json(req): Json<ChangePasswordRequest>,
/// ) -> Reply<()> { ... }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    pub account_id: String,
    pub email: String,
    pub roles: Vec<String>,
}

type Rejection = (StatusCode, Json<ApiResult<()>>);

fn unauthorized(reason: &str) -> Rejection {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResult::failure(
            ResultMessage::UNAUTHORIZED,
            vec![reason.to_string()],
        )),
    )
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedAccount {
    type Rejection = Rejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| unauthorized("Missing authorization header"))?
            .to_str()
            .map_err(|_| unauthorized("Invalid authorization header"))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| unauthorized("Expected 'Bearer <token>'"))?;

        let claims = state
            .tokens
            .validate_access_token(token)
            .map_err(|e| unauthorized(e.reason()))?;

        Ok(AuthenticatedAccount {
            account_id: claims.sub,
            email: claims.email,
            roles: claims.roles,
        })
    }
}
