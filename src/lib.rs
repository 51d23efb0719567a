pub mod config;
pub mod modules;
pub mod services;

use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use config::{LockoutPolicy, TokenConfig};
use modules::account::account_routes;
use modules::auth::{auth_routes, AccountStore};
use modules::metrics::metrics_routes;
use services::metrics::{metrics_middleware, MetricsRegistry};
use services::notification::EventPublisher;
use services::session::SessionGate;
use services::token::TokenService;

pub struct AppState {
    pub session: Arc<SessionGate>,
    pub tokens: Arc<TokenService>,
    pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        publisher: EventPublisher,
        token_config: &TokenConfig,
        lockout: LockoutPolicy,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(accounts.clone(), token_config));
        let session = Arc::new(SessionGate::new(
            accounts,
            tokens.clone(),
            publisher,
            lockout,
        ));

        Self {
            session,
            tokens,
            metrics,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .nest("/auth", auth_routes())
        .nest("/account", account_routes())
        .merge(metrics_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(1024 * 16)) // 16KB max body
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
