//! Random quote shown on the login page

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use super::{ApiError, AppState};
use crate::gateway::{Table, TableQuery};
use crate::types::Quote;

/// GET /api/citations: public; `null` when no quote is stored.
pub async fn random_quote(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<Quote>>, ApiError> {
    let rows = state
        .gateway
        .fetch(&TableQuery::new(Table::Citations))
        .await?;
    Ok(Json(rows.first().and_then(Quote::from_row)))
}
