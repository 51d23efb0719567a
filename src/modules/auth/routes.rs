use axum::{routing::post, Router};
use std::sync::Arc;

use crate::AppState;
use super::controller::{login, refresh, revoke, sign_up, verify_sign_up};

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/revoke", post(revoke))
        .route("/signup", post(sign_up))
        .route("/signup/verify", post(verify_sign_up))
}
