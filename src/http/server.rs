//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router: relay socket, health, admin API
//! - Wire up middleware (request ID, tracing)
//! - Serve until the shared shutdown signal fires

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderName;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::context::WalletContext;
use crate::http::websocket::relay_upgrade;
use crate::provider::ChainId;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<WalletContext>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub vault_initialized: bool,
    pub vault_unlocked: bool,
    pub chains: Vec<ChainId>,
}

pub fn build_router(ctx: Arc<WalletContext>) -> Router {
    let state = AppState { ctx: ctx.clone() };

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/relay", get(relay_upgrade))
        .with_state(state.clone());

    if ctx.config().admin.enabled {
        router = router.merge(admin::setup_admin_router(state));
    } else {
        tracing::info!("Admin API disabled");
    }

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
    )
}

/// Accept connections until the context's shutdown fires.
pub async fn serve(ctx: Arc<WalletContext>, listener: TcpListener) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    let mut shutdown = ctx.shutdown().subscribe();
    tracing::info!(address = %addr, "Wallet relay listening");

    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let vault = state.ctx.vault().status();
    Json(HealthReport {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        vault_initialized: vault.initialized,
        vault_unlocked: vault.unlocked,
        chains: state.ctx.pool().supported_chains(),
    })
}
