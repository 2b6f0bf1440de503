//! HTTP API: route registration and shared state
//!
//! - `gateway`   : `/api/sql` table reads and inserts
//! - `auth`      : login, logout, current user
//! - `dashboard` : per-session controller: load, view, selection
//! - `evolutions`: evolution request history and submission
//! - `citations` : random quote for the login page
//! - `health`    : liveness and database connectivity

pub mod auth;
pub mod citations;
pub mod dashboard;
pub mod error;
pub mod evolutions;
pub mod gateway;
pub mod health;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use chrono::NaiveDate;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{hash_password, spawn_session_cleanup, LoginAttempts, SessionStore};
use crate::config::defaults::{
    LOGIN_FAILURE_WINDOW_SECS, MAX_BODY_BYTES, MAX_LOGIN_FAILURES, SESSION_CLEANUP_INTERVAL_SECS,
};
use crate::config::DashboardConfig;
use crate::controller::ControllerOptions;
use crate::gateway::QueryGateway;

pub use error::{ApiError, ErrorBody, MessageBody};

/// Shared application state
pub struct AppState {
    pub gateway: Arc<dyn QueryGateway>,
    pub config: DashboardConfig,
    pub sessions: Arc<SessionStore>,
    pub login_attempts: Arc<LoginAttempts>,
    /// Fixed "today" for reproducible runs; the local date otherwise
    pub fixed_today: Option<NaiveDate>,
    /// Hash checked for unknown user names; built on first use
    decoy_hash: OnceLock<String>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn QueryGateway>, config: DashboardConfig) -> Arc<Self> {
        Arc::new(Self::build(gateway, config, None))
    }

    /// Same as [`AppState::new`] with a pinned date.
    pub fn with_today(
        gateway: Arc<dyn QueryGateway>,
        config: DashboardConfig,
        today: NaiveDate,
    ) -> Arc<Self> {
        Arc::new(Self::build(gateway, config, Some(today)))
    }

    fn build(
        gateway: Arc<dyn QueryGateway>,
        config: DashboardConfig,
        fixed_today: Option<NaiveDate>,
    ) -> Self {
        let options = ControllerOptions {
            restrict_to_reported_agencies: config.restrict_to_reported_agencies,
        };
        Self {
            gateway,
            sessions: Arc::new(SessionStore::new(config.session_ttl(), options)),
            login_attempts: Arc::new(LoginAttempts::new(
                MAX_LOGIN_FAILURES,
                Duration::from_secs(LOGIN_FAILURE_WINDOW_SECS),
            )),
            config,
            fixed_today,
            decoy_hash: OnceLock::new(),
        }
    }

    pub fn decoy_hash(&self) -> &str {
        self.decoy_hash
            .get_or_init(|| hash_password("", self.config.pbkdf2_iterations))
    }

    pub fn today(&self) -> NaiveDate {
        self.fixed_today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Start the periodic purge of expired sessions and login failures.
    pub fn spawn_cleanup(&self) {
        spawn_session_cleanup(
            Arc::clone(&self.sessions),
            Arc::clone(&self.login_attempts),
            Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS),
        );
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Build the complete dashboard API router
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Query gateway
        .route("/sql", get(gateway::get_rows).post(gateway::insert_row))
        // Authentication
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        // Dashboard
        .route("/dashboard/load", post(dashboard::load))
        .route("/dashboard/view", get(dashboard::view))
        .route("/dashboard/selection", put(dashboard::update_selection))
        // Evolution requests
        .route(
            "/evolutions",
            get(evolutions::list_evolutions).post(evolutions::submit_evolution),
        )
        // Login page quote
        .route("/citations", get(citations::random_quote));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health::get_health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
