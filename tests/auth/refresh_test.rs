use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use task_tracker::config::TokenConfig;
use task_tracker::modules::auth::interface::REFRESH_TOKEN_PROVIDER;
use task_tracker::modules::auth::{AccountStatus, AccountStore};
use task_tracker::services::token::{TokenError, TokenService};

use crate::common::{test_password, InterleavingStore, TestContext, TEST_SECRET};

async fn login_tokens(ctx: &TestContext, email: &str) -> serde_json::Value {
    let body: serde_json::Value = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": email,
            "password": test_password()
        }))
        .await
        .json();
    body["data"].clone()
}

#[tokio::test]
async fn refresh_returns_new_pair_and_rotates_stored_token() {
    let ctx = TestContext::new();
    let account = ctx.create_account(AccountStatus::Active).await;
    let tokens = login_tokens(&ctx, &account.email).await;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": tokens["refresh_token"] }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Token refreshed.");
    assert_ne!(body["data"]["refresh_token"], tokens["refresh_token"]);

    let stored = ctx
        .accounts
        .refresh_token(&account.id, REFRESH_TOKEN_PROVIDER)
        .await
        .unwrap();
    assert_eq!(stored.as_deref(), body["data"]["refresh_token"].as_str());
}

#[tokio::test]
async fn refreshing_twice_with_same_token_succeeds_once() {
    let ctx = TestContext::new();
    let account = ctx.create_account(AccountStatus::Active).await;
    let tokens = login_tokens(&ctx, &account.email).await;

    ctx.server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": tokens["refresh_token"] }))
        .await
        .assert_status(StatusCode::OK);

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": tokens["refresh_token"] }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Token refresh failed.");
    assert_eq!(body["errors"][0], "Invalid token");
}

#[tokio::test]
async fn concurrent_refreshes_with_same_token_have_one_winner() {
    let ctx = TestContext::new();
    let account = ctx.create_account(AccountStatus::Active).await;
    let signed_in = ctx
        .session
        .sign_in(&account.email, test_password())
        .await
        .unwrap();
    let presented = signed_in.tokens.refresh_token;

    // Both refreshes read the stored token before either swaps, so both pass
    // the equality check and only the swap can pick the winner.
    let store = InterleavingStore::new(ctx.accounts.clone()).with_token_read_barrier(2);
    let tokens = TokenService::new(Arc::new(store), &TokenConfig::new(TEST_SECRET));

    let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            tokens.refresh_token(&presented),
            tokens.refresh_token(&presented)
        )
    })
    .await
    .expect("refreshes did not both reach the stored-token check");

    let results = [a, b];
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(TokenError::TokenMismatch))));

    let stored = ctx
        .accounts
        .refresh_token(&account.id, REFRESH_TOKEN_PROVIDER)
        .await
        .unwrap();
    assert_eq!(stored.as_deref(), Some(winners[0].refresh_token.as_str()));
}

#[tokio::test]
async fn refresh_for_deactivated_account_is_forbidden() {
    let ctx = TestContext::new();
    let account = ctx.create_account(AccountStatus::Active).await;
    let tokens = login_tokens(&ctx, &account.email).await;

    ctx.accounts
        .update_status(&account.id, AccountStatus::Active, AccountStatus::InActive)
        .await
        .unwrap();

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": tokens["refresh_token"] }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["errors"][0], "Account is not active");
}

#[tokio::test]
async fn refresh_with_garbage_token_is_unauthorized() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": "definitely-not-a-protected-token" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_with_empty_token_is_bad_request() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": "" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refresh_for_removed_account_is_unauthorized() {
    let ctx = TestContext::new();
    let account = ctx.create_account(AccountStatus::Active).await;
    let tokens = login_tokens(&ctx, &account.email).await;

    ctx.accounts.delete(&account.id).await.unwrap();

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": tokens["refresh_token"] }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let result = ctx
        .tokens
        .refresh_token(tokens["refresh_token"].as_str().unwrap())
        .await;
    assert!(matches!(result, Err(TokenError::AccountNotFound)));
}

#[tokio::test]
async fn refreshed_access_token_validates() {
    let ctx = TestContext::new();
    let account = ctx.create_account(AccountStatus::Active).await;
    let tokens = login_tokens(&ctx, &account.email).await;

    let body: serde_json::Value = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": tokens["refresh_token"] }))
        .await
        .json();

    let claims = ctx
        .tokens
        .validate_access_token(body["data"]["access_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.sub, account.id);
    assert_eq!(claims.email, account.email);
    assert_eq!(claims.roles, vec!["User"]);
}
