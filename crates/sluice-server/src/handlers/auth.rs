//! `/register` and `/login`, forwarded to the identity service

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::identity::Credentials;
use crate::state::AppState;

fn credentials(body: Result<Json<Credentials>, JsonRejection>) -> Result<Credentials, ApiError> {
    let Json(credentials) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if credentials.username.trim().is_empty() {
        return Err(ApiError::bad_request("username is required"));
    }
    if credentials.password.is_empty() {
        return Err(ApiError::bad_request("password is required"));
    }
    Ok(credentials)
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let credentials = credentials(body)?;
    let registration = state.identity.register(&credentials).await.map_err(|e| {
        tracing::warn!(username = %credentials.username, error = %e, "registration failed");
        ApiError::internal(e.to_string())
    })?;

    tracing::info!(user_id = %registration.user_id, "user registered");
    Ok(Json(json!({
        "message": registration.message,
        "user_id": registration.user_id,
    })))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let credentials = credentials(body)?;
    let grant = state.identity.login(&credentials).await.map_err(|e| {
        tracing::debug!(username = %credentials.username, error = %e, "login rejected");
        ApiError::unauthorized(e.to_string())
    })?;

    Ok(Json(json!({
        "token": grant.token,
        "username": grant.username,
        "role": grant.role,
    })))
}
