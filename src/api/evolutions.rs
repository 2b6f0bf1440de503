//! Evolution request history and submission

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use super::{ApiError, AppState, MessageBody};
use crate::auth::SessionAuth;
use crate::gateway::{GatewayFilter, Table, TableQuery, WriteRequest};
use crate::types::{
    build_history, EvolutionHistoryRow, EvolutionRecord, EvolutionRequest, Status,
    RECENT_PER_ROBOT,
};

/// GET /api/evolutions?robot=&agency=: history list, most recent first.
///
/// Without a filter only the most recent requests of each robot are listed.
pub async fn list_evolutions(
    State(state): State<Arc<AppState>>,
    _session: SessionAuth,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<EvolutionHistoryRow>>, ApiError> {
    let filter = GatewayFilter::from_params(&params)?;
    let unfiltered = filter.robot.is_none() && filter.agency.is_none();

    let rows = state
        .gateway
        .fetch(&TableQuery::new(Table::Evolutions).with_filter(filter))
        .await?;
    let statuses: Vec<Status> = state
        .gateway
        .fetch(&TableQuery::new(Table::Statuts))
        .await?
        .iter()
        .filter_map(Status::from_row)
        .collect();

    let records = rows.iter().filter_map(EvolutionRecord::from_row).collect();
    let limit = unfiltered.then_some(RECENT_PER_ROBOT);
    Ok(Json(build_history(records, &statuses, limit)))
}

/// POST /api/evolutions: validate and store a request. Edits are stored as
/// a new row.
pub async fn submit_evolution(
    State(state): State<Arc<AppState>>,
    SessionAuth(session): SessionAuth,
    Json(request): Json<EvolutionRequest>,
) -> Result<(StatusCode, Json<MessageBody>), ApiError> {
    let request = request.normalized(state.today())?;
    info!(
        user = %session.user.name,
        robot = %request.robot,
        kind = request.request_type.as_str(),
        "Evolution request submitted"
    );
    let write = WriteRequest::Evolution(request);
    let message = write.success_message();
    state.gateway.insert(write).await?;
    Ok((StatusCode::CREATED, Json(MessageBody::new(message))))
}
