use axum::{routing::post, Router};
use std::sync::Arc;

use super::controller::{change_password, initiate_password_reset, reset_password};
use crate::AppState;

pub fn account_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/change-password", post(change_password))
        .route("/password-reset/initial", post(initiate_password_reset))
        .route("/password-reset", post(reset_password))
}
