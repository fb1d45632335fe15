//! Admission middleware
//!
//! Runs the [`AdmissionController`] in front of every route. Denied requests
//! get `429`; store failures are logged by the controller and let through.
//!
//! [`AdmissionController`]: sluice_limiter::AdmissionController

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sluice_limiter::Decision;

use crate::error::ApiError;
use crate::middleware::ws_auth::AuthenticatedIdentity;
use crate::state::AppState;

pub async fn admission(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);
    let identity = request
        .extensions()
        .get::<AuthenticatedIdentity>()
        .map(|id| id.user_id.clone());

    let route = request.uri().path().to_string();
    let method = request.method().as_str().to_string();

    let decision = state
        .admission
        .check(&route, &method, &ip, identity.as_deref())
        .await;

    match decision {
        Decision::Denied => {
            tracing::debug!(ip = %ip, route = %route, "request denied by admission");
            ApiError::too_many_requests().into_response()
        }
        Decision::Allowed | Decision::FailedOpen(_) => next.run(request).await,
    }
}

/// First `X-Forwarded-For` entry, else `X-Real-IP`, else the peer address
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}
