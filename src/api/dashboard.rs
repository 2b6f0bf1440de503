//! Per-session dashboard: cache load, view and selection changes

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use super::{ApiError, AppState};
use crate::auth::SessionAuth;
use crate::controller::{ControllerState, DashboardView, ViewController};
use crate::types::{is_all_sentinel, AgencyFilter, MonthKey, RobotKey, RobotSelection, ServiceFilter};

/// Robot choice as sent by clients: the sentinel, a typed key, or the
/// legacy `AGENCY_ROBOT` string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RobotChoice {
    Key(RobotKey),
    Text(String),
}

impl RobotChoice {
    fn resolve(self, controller: &ViewController) -> Result<RobotSelection, ApiError> {
        match self {
            Self::Key(key) => Ok(RobotSelection::One(key)),
            Self::Text(text) if is_all_sentinel(text.trim()) => Ok(RobotSelection::All),
            Self::Text(text) => {
                let agencies = controller.robots().iter().map(|p| p.agency.as_str());
                RobotKey::parse_legacy(text.trim(), agencies)
                    .map(RobotSelection::One)
                    .ok_or_else(|| ApiError::BadRequest(format!("Unknown robot: {text}")))
            }
        }
    }
}

/// Fields are applied in order: agency, service, robot, month. A rejected
/// field leaves the whole selection unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct SelectionUpdate {
    pub agency: Option<String>,
    pub service: Option<String>,
    pub robot: Option<RobotChoice>,
    pub month: Option<String>,
}

/// POST /api/dashboard/load: fetch reference data and reporting months,
/// then apply the default selection.
pub async fn load(
    State(state): State<Arc<AppState>>,
    SessionAuth(session): SessionAuth,
) -> Result<Json<DashboardView>, ApiError> {
    let mut controller = session.controller.lock().await;
    if controller.state() == ControllerState::NotAuthenticated {
        // A failed load leaves the controller unauthenticated; the session
        // itself is still valid.
        controller.start(session.user.clone())?;
    }
    controller.load(state.gateway.as_ref(), state.today()).await?;
    Ok(Json(controller.view()))
}

/// GET /api/dashboard/view
pub async fn view(SessionAuth(session): SessionAuth) -> Json<DashboardView> {
    let controller = session.controller.lock().await;
    Json(controller.view())
}

/// PUT /api/dashboard/selection
pub async fn update_selection(
    SessionAuth(session): SessionAuth,
    Json(update): Json<SelectionUpdate>,
) -> Result<Json<DashboardView>, ApiError> {
    let mut controller = session.controller.lock().await;
    debug!(user = %session.user.name, ?update, "Selection update");

    controller.with_rollback(|controller| -> Result<(), ApiError> {
        if let Some(agency) = update.agency {
            controller.select_agency(AgencyFilter::parse(&agency))?;
        }
        if let Some(service) = update.service {
            controller.select_service(ServiceFilter::parse(&service))?;
        }
        if let Some(robot) = update.robot {
            let selection = robot.resolve(controller)?;
            controller.select_robot(selection)?;
        }
        if let Some(month) = update.month {
            controller.select_month(MonthKey::parse(&month))?;
        }
        Ok(())
    })?;
    Ok(Json(controller.view()))
}
