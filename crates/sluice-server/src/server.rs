//! HTTP server - router assembly and lifecycle

use std::future::Future;
use std::net::SocketAddr;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, diagnostics, ws};
use crate::middleware::{admission, ws_auth};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    // Layers added last run first: the token check precedes admission so
    // per-identity rules see the caller.
    let upgrade = Router::new()
        .route(&state.config.gateway.path, get(ws::upgrade))
        .route_layer(from_fn_with_state(state.clone(), admission))
        .route_layer(from_fn_with_state(state.clone(), ws_auth));

    let api = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/health", get(diagnostics::health))
        .route("/metrics", get(diagnostics::metrics))
        .route_layer(from_fn_with_state(state.clone(), admission));

    let router = upgrade
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    if state.config.server.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve until `shutdown` resolves, then close every live session and wait
/// for the registry loop to finish.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    registry_task: JoinHandle<()>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = state.registry().clone();
    let app = create_router(state);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "gateway listening");
    }

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("shutdown requested, closing sessions");
            registry.shutdown().await;
        })
        .await?;

    if let Err(e) = registry_task.await {
        tracing::warn!(error = %e, "registry task ended abnormally");
    }
    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
