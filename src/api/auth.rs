//! Login, logout and current user

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ApiError, AppState, MessageBody};
use crate::auth::{authenticate, SessionAuth};
use crate::types::UserRecord;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "USER_NAME", default)]
    pub user_name: Option<String>,
    #[serde(rename = "USER_PASSWORD", default)]
    pub user_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    #[serde(rename = "userData")]
    pub user_data: UserRecord,
    pub token: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let name = req.user_name.unwrap_or_default();
    let password = req.user_password.unwrap_or_default();
    let user = authenticate(
        state.gateway.as_ref(),
        &state.login_attempts,
        state.decoy_hash(),
        &name,
        &password,
    )
    .await?;

    let session = state.sessions.create(user).map_err(|e| {
        warn!(error = %e, "Could not open session");
        ApiError::Internal(e.to_string())
    })?;

    Ok(Json(LoginResponse {
        message: "Authentication successful",
        user_data: session.user.clone(),
        token: session.token.clone(),
    }))
}

/// POST /api/auth/logout: close the session; loads in flight are discarded.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    SessionAuth(session): SessionAuth,
) -> Json<MessageBody> {
    state.sessions.remove(&session.token);
    Json(MessageBody::new("Logged out"))
}

/// GET /api/auth/me
pub async fn me(SessionAuth(session): SessionAuth) -> Json<UserRecord> {
    Json(session.user.clone())
}
