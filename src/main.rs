//! RPA Dashboard: HTTP service binary
//!
//! ## Environment variables
//!
//! | Variable                | Required | Description                              |
//! |-------------------------|----------|------------------------------------------|
//! | `DATABASE_URL`          | Yes*     | PostgreSQL connection string             |
//! | `RPA_DASHBOARD_CONFIG`  | No       | Path to a TOML config file               |
//! | `RPA_BIND_ADDRESS`      | No       | Bind address (default `0.0.0.0:8080`)    |
//! | `RPA_SESSION_TTL_SECS`  | No       | Session inactivity timeout               |
//! | `RPA_CORS_ORIGINS`      | No       | Comma-separated allowed origins          |
//! | `RPA_LOG_FORMAT`        | No       | `pretty` or `json`                       |
//!
//! \* not needed with `--demo`, which serves seeded in-memory data.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use rpa_dashboard::api::{build_router, AppState};
use rpa_dashboard::auth::hash_password;
use rpa_dashboard::config::defaults::{DEMO_PASSWORD, DEMO_USER};
use rpa_dashboard::config::{DashboardConfig, LogFormat};
use rpa_dashboard::gateway::{postgres, MemoryGateway, PgGateway, QueryGateway};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rpa-dashboard", about = "RPA reporting dashboard service")]
struct CliArgs {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Bind address (e.g. 127.0.0.1:8080)
    #[arg(long)]
    bind_address: Option<String>,

    /// Port to listen on (ignored when --bind-address is given)
    #[arg(long, short)]
    port: Option<u16>,

    /// Serve seeded in-memory data instead of PostgreSQL
    #[arg(long)]
    demo: bool,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rpa_dashboard=debug"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();

    let (mut config, report) = DashboardConfig::load()?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(addr) = args.bind_address {
        config.bind_address = addr;
    } else if let Some(port) = args.port {
        config.bind_address = format!("0.0.0.0:{port}");
    }
    if args.json_logs {
        config.log_format = LogFormat::Json;
    }

    init_tracing(config.log_format);
    report.log();
    config.validate()?;
    info!(bind = %config.bind_address, demo = args.demo, "Starting RPA dashboard");

    // ── Gateway ───────────────────────────────────────────────────────────────
    let gateway: Arc<dyn QueryGateway> = if args.demo {
        warn!(user = DEMO_USER, "Demo mode: serving in-memory data");
        let today = chrono::Local::now().date_naive();
        let hash = hash_password(DEMO_PASSWORD, config.pbkdf2_iterations);
        Arc::new(MemoryGateway::demo(today, &hash).await)
    } else {
        if config.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL must be set via --database-url or DATABASE_URL env var");
        }
        let pool = postgres::create_pool(&config.database_url, config.max_connections).await?;
        postgres::run_migrations(&pool).await?;
        Arc::new(PgGateway::new(pool))
    };

    // ── App State ─────────────────────────────────────────────────────────────
    let bind_address = config.bind_address.clone();
    let state = AppState::new(gateway, config);
    state.spawn_cleanup();
    info!("Session cleanup task started");

    // ── HTTP Server ───────────────────────────────────────────────────────────
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "RPA dashboard listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("RPA dashboard shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
