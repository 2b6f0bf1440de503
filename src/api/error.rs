//! Mapping of domain errors to HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;
use crate::controller::ControllerError;
use crate::gateway::GatewayError;
use crate::store::StoreError;
use crate::types::ValidationError;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// `{message}` body used by the login endpoints and write confirmations.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Controller(ControllerError::Load(err))
    }
}

fn gateway_response(err: &GatewayError) -> (StatusCode, ErrorBody) {
    match err {
        GatewayError::DisallowedTable(_)
        | GatewayError::MissingPayload
        | GatewayError::InvalidFilter { .. } => (StatusCode::BAD_REQUEST, ErrorBody::new(err.to_string())),
        GatewayError::InvalidPayload { reason, .. } => (
            StatusCode::BAD_REQUEST,
            ErrorBody::with_details("Invalid payload", reason.clone()),
        ),
        GatewayError::ReadOnlyTable(_) => (
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorBody::new(err.to_string()),
        ),
        GatewayError::Database(details) => {
            error!(error = %details, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::with_details("Database error", details.clone()),
            )
        }
    }
}

fn controller_response(err: &ControllerError) -> (StatusCode, ErrorBody) {
    match err {
        ControllerError::MissingUserId => (StatusCode::BAD_REQUEST, ErrorBody::new(err.to_string())),
        ControllerError::InvalidState(_) | ControllerError::Load(StoreError::Stale { .. }) => {
            (StatusCode::CONFLICT, ErrorBody::new(err.to_string()))
        }
        ControllerError::UnknownAgency(_) | ControllerError::UnknownRobot(_) => {
            (StatusCode::NOT_FOUND, ErrorBody::new(err.to_string()))
        }
        ControllerError::Load(StoreError::Gateway(inner)) => gateway_response(inner),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Gateway(err) => gateway_response(err),
            Self::Controller(err) => controller_response(err),
            Self::Validation(err) => (StatusCode::BAD_REQUEST, ErrorBody::new(err.to_string())),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new(msg.clone())),
            Self::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Internal server error"),
                )
            }
            Self::Auth(err) => {
                let status = match err {
                    AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
                    AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                    AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
                    AuthError::Storage(inner) => {
                        error!(error = %inner, "Login lookup failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                return (status, Json(MessageBody::new(err.to_string()))).into_response();
            }
        };
        (status, Json(body)).into_response()
    }
}
