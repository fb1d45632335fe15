//! Bearer token check on the upgrade route.
//!
//! The token travels as `?token=` because browsers cannot set headers on a
//! WebSocket handshake.

use std::collections::HashMap;

use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::identity::IdentityError;
use crate::state::AppState;

/// Identity attached to the request once its token has been validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub user_id: String,
    pub role: String,
}

pub async fn ws_auth(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match params.get("token").map(|t| t.trim()).filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => return ApiError::unauthorized("Missing token").into_response(),
    };

    match state.identity.validate(token).await {
        Ok(claims) if claims.valid => {
            tracing::debug!(user_id = %claims.identity, "upgrade token accepted");
            request.extensions_mut().insert(AuthenticatedIdentity {
                user_id: claims.identity,
                role: claims.role,
            });
            next.run(request).await
        }
        Ok(_) | Err(IdentityError::Rejected(_)) => {
            ApiError::unauthorized("Invalid token").into_response()
        }
        Err(e @ IdentityError::Unavailable(_)) => {
            tracing::error!(error = %e, "token validation failed");
            ApiError::internal("Internal auth error").into_response()
        }
    }
}
