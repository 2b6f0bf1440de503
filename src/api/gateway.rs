//! `/api/sql`: whitelisted table reads and inserts

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{ApiError, AppState, MessageBody};
use crate::auth::SessionAuth;
use crate::gateway::{GatewayError, GatewayFilter, Table, TableQuery, WriteRequest};

#[derive(Debug, Deserialize)]
pub struct WriteBody {
    pub table: Option<String>,
    pub data: Option<Value>,
}

fn parse_table(name: Option<&str>) -> Result<Table, GatewayError> {
    let name = name.map(str::trim).unwrap_or_default();
    Table::parse(name).ok_or_else(|| GatewayError::DisallowedTable(name.to_string()))
}

/// GET /api/sql?table=...&filters: rows of one whitelisted table.
///
/// `Citations` answers a single row, or `null` when the table is empty.
pub async fn get_rows(
    State(state): State<Arc<AppState>>,
    SessionAuth(session): SessionAuth,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let table = parse_table(params.get("table").map(String::as_str))?;
    let filter = GatewayFilter::from_params(&params)?;
    let rows = state
        .gateway
        .fetch(&TableQuery::new(table).with_filter(filter))
        .await?;
    info!(user = %session.user.name, %table, rows = rows.len(), "Table read");

    let body = if table == Table::Citations {
        rows.into_iter().next().map_or(Value::Null, Value::Object)
    } else {
        Value::Array(rows.into_iter().map(Value::Object).collect())
    };
    Ok(Json(body))
}

/// POST /api/sql `{table, data}`: insert into `Reporting` or `Evolutions`.
pub async fn insert_row(
    State(state): State<Arc<AppState>>,
    SessionAuth(session): SessionAuth,
    Json(body): Json<WriteBody>,
) -> Result<(StatusCode, Json<MessageBody>), ApiError> {
    let (Some(name), Some(data)) = (body.table, body.data.filter(|d| !d.is_null())) else {
        return Err(GatewayError::MissingPayload.into());
    };
    let table = parse_table(Some(name.as_str()))?;
    if !table.is_writable() {
        return Err(GatewayError::ReadOnlyTable(table).into());
    }

    let request = match WriteRequest::from_payload(table, data)? {
        WriteRequest::Evolution(req) => WriteRequest::Evolution(req.normalized(state.today())?),
        other => other,
    };
    let message = request.success_message();
    state.gateway.insert(request).await?;
    info!(user = %session.user.name, %table, "Row inserted");

    Ok((StatusCode::CREATED, Json(MessageBody::new(message))))
}
