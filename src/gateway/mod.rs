//! Query gateway: whitelisted table reads and the two writable tables
//!
//! Everything above this layer works on [`RawRow`]s and never sees SQL.
//! - `postgres`: sqlx/PostgreSQL implementation
//! - `memory`: in-process tables for tests and demo mode

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::{
    EvolutionRequest, NewReportingRow, RawRow, StoredUser, YearMonth,
};

pub use memory::MemoryGateway;
pub use postgres::PgGateway;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid or disallowed table parameter")]
    DisallowedTable(String),

    #[error("POST operation not supported for this table")]
    ReadOnlyTable(Table),

    #[error("Table and data are required for POST request")]
    MissingPayload,

    #[error("invalid payload for {table}: {reason}")]
    InvalidPayload { table: Table, reason: String },

    #[error("invalid filter {name}: {value}")]
    InvalidFilter { name: &'static str, value: String },

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

// ============================================================================
// Tables
// ============================================================================

/// Whitelisted tables. Any other name is rejected before reaching storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Table {
    Reporting,
    Citations,
    Services,
    Statuts,
    AgencesV2,
    Evolutions,
    #[serde(rename = "Barem_Reporting")]
    BaremReporting,
}

impl Table {
    pub const ALL: [Self; 7] = [
        Self::Reporting,
        Self::Citations,
        Self::Services,
        Self::Statuts,
        Self::AgencesV2,
        Self::Evolutions,
        Self::BaremReporting,
    ];

    /// Exact wire name match.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reporting => "Reporting",
            Self::Citations => "Citations",
            Self::Services => "Services",
            Self::Statuts => "Statuts",
            Self::AgencesV2 => "AgencesV2",
            Self::Evolutions => "Evolutions",
            Self::BaremReporting => "Barem_Reporting",
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Self::Reporting | Self::Evolutions)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Optional filters understood by the gateway. Each table ignores the
/// filters that do not apply to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayFilter {
    /// `Reporting`: legacy `AGENCE_ROBOT` key
    pub clef: Option<String>,
    /// `Reporting`: month
    pub year_month: Option<YearMonth>,
    /// `AgencesV2`: agency code
    pub agency_name: Option<String>,
    /// `Evolutions`: robot name
    pub robot: Option<String>,
    /// `Evolutions`: robots with reporting rows in this agency
    pub agency: Option<String>,
}

impl GatewayFilter {
    /// Build from HTTP query parameters, accepting the historical aliases.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, GatewayError> {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|n| params.get(*n))
                .map(|v| v.trim())
                .find(|v| !v.is_empty())
                .map(str::to_string)
        };

        let year_month = match first(&["AnneeMois"]) {
            Some(raw) => Some(
                raw.parse::<i64>()
                    .ok()
                    .and_then(YearMonth::from_int)
                    .ok_or(GatewayError::InvalidFilter {
                        name: "AnneeMois",
                        value: raw,
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            clef: first(&["Clef"]),
            year_month,
            agency_name: first(&["agenceName"]),
            robot: first(&["robot", "robotId", "programme"]),
            agency: first(&["agency", "agence", "agencyCode"]),
        })
    }
}

/// One read against a whitelisted table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub table: Table,
    pub filter: GatewayFilter,
}

impl TableQuery {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            filter: GatewayFilter::default(),
        }
    }

    pub fn reporting_month(year_month: YearMonth) -> Self {
        Self {
            table: Table::Reporting,
            filter: GatewayFilter {
                year_month: Some(year_month),
                ..GatewayFilter::default()
            },
        }
    }

    pub fn with_filter(mut self, filter: GatewayFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Insert into one of the writable tables.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    Reporting(NewReportingRow),
    Evolution(EvolutionRequest),
}

impl WriteRequest {
    /// Decode a `{table, data}` payload.
    pub fn from_payload(table: Table, data: serde_json::Value) -> Result<Self, GatewayError> {
        let invalid = |e: serde_json::Error| GatewayError::InvalidPayload {
            table,
            reason: e.to_string(),
        };
        match table {
            Table::Reporting => serde_json::from_value(data)
                .map(Self::Reporting)
                .map_err(invalid),
            Table::Evolutions => serde_json::from_value(data)
                .map(Self::Evolution)
                .map_err(invalid),
            other => Err(GatewayError::ReadOnlyTable(other)),
        }
    }

    pub fn table(&self) -> Table {
        match self {
            Self::Reporting(_) => Table::Reporting,
            Self::Evolution(_) => Table::Evolutions,
        }
    }

    /// Message returned with 201 Created.
    pub fn success_message(&self) -> &'static str {
        match self {
            Self::Reporting(_) => "Reporting data inserted successfully",
            Self::Evolution(_) => "Evolution data inserted successfully",
        }
    }
}

// ============================================================================
// Gateway Trait
// ============================================================================

/// Storage behind the dashboard.
#[async_trait]
pub trait QueryGateway: Send + Sync {
    /// Rows of one table. `Citations` yields at most one random row.
    async fn fetch(&self, query: &TableQuery) -> Result<Vec<RawRow>, GatewayError>;

    async fn insert(&self, request: WriteRequest) -> Result<(), GatewayError>;

    /// Look up a user by login name.
    async fn find_user(&self, name: &str) -> Result<Option<StoredUser>, GatewayError>;

    /// Storage reachability for the health endpoint.
    async fn ping(&self) -> bool {
        true
    }
}
