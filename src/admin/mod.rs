pub mod auth;
pub mod handlers;

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

#[allow(deprecated)]
pub fn setup_admin_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.ctx.config().admin.request_timeout_secs);

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/providers", get(get_providers))
        .route("/admin/providers/switch", post(switch_provider))
        .route("/admin/approvals", get(get_approvals))
        .route("/admin/approvals/{id}", post(decide_approval))
        .route("/admin/accounts", get(get_accounts).post(derive_account))
        .route("/admin/accounts/{id}/select", post(select_account))
        .route("/admin/accounts/{id}/retire", post(retire_account))
        .route("/admin/accounts/{id}/balance", post(set_include_in_balance))
        .route("/admin/vault", post(create_vault))
        .route("/admin/vault/unlock", post(unlock_vault))
        .route("/admin/vault/lock", post(lock_vault))
        .route("/admin/vault/passphrase", post(change_passphrase))
        .route("/admin/vault/acknowledge", post(acknowledge_fault))
        .route("/admin/sessions", get(get_sessions))
        .route("/admin/sessions/revoke", post(revoke_session))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}
