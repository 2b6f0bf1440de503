//! RPA Dashboard: robot execution reporting service
//!
//! Per-agency robot metrics over the current and three previous reporting
//! months, with evolution requests and a thin whitelisted query gateway.
//!
//! ## Architecture
//!
//! - **Gateway**: whitelisted table reads/inserts (PostgreSQL or in-memory)
//! - **Store**: per-session reference data and reporting months, published as
//!   immutable snapshots
//! - **Aggregator**: day series and month totals for one robot or a set
//! - **Controller**: per-session selection state machine
//! - **API**: axum routes, bearer-token sessions

pub mod aggregator;
pub mod api;
pub mod auth;
pub mod config;
pub mod controller;
pub mod gateway;
pub mod store;
pub mod types;

// Re-export configuration
pub use config::DashboardConfig;

// Re-export commonly used types
pub use types::{
    AgencyFilter, MonthKey, Program, RobotKey, RobotSelection, ServiceFilter, UserRecord,
    YearMonth,
};

// Re-export the main components
pub use aggregator::{aggregate_all, aggregate_robot, ChartData};
pub use api::{build_router, AppState};
pub use controller::{ControllerState, DashboardView, ViewController};
pub use gateway::{MemoryGateway, PgGateway, QueryGateway};
pub use store::{DataStore, StoreSnapshot};
