//! Session token extractor

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;

use super::Session;
use crate::api::{AppState, ErrorBody};

/// Request made with a live session token.
pub struct SessionAuth(pub Arc<Session>);

/// Extract Bearer token from Authorization header.
pub(crate) fn extract_bearer(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionAuth {
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(parts).ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new("Missing Bearer token")),
        ))?;

        state.sessions.get(&token).map(SessionAuth).ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new("Session expired or unknown")),
        ))
    }
}
