//! Dashboard view controller
//!
//! One controller per session. Drives the load order (agencies, robots,
//! services, reporting, initial selection) and recomputes the aggregate on
//! every selection change.
//!
//! ```text
//! NotAuthenticated --start--> LoadingReferenceData --load ok--> Ready
//!        ^                              |                         |
//!        +---------- load failed -------+------ reset/logout -----+
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::{self, AllRobotsAggregate, RobotAggregate, NO_DATA_MESSAGE};
use crate::gateway::QueryGateway;
use crate::store::{DataStore, ReferenceData, StoreError, StoreSnapshot};
use crate::types::{
    Agency, AgencyFilter, MonthKey, Program, RobotKey, RobotSelection, ServiceFilter, UserRecord,
    YearMonth, ALL_SENTINEL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    NotAuthenticated,
    LoadingReferenceData,
    Ready,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("a non-empty user id is required")]
    MissingUserId,

    #[error("operation not allowed in state {0:?}")]
    InvalidState(ControllerState),

    #[error("unknown agency: {0}")]
    UnknownAgency(String),

    #[error("robot {0} is not in the current robot list")]
    UnknownRobot(RobotKey),

    #[error(transparent)]
    Load(#[from] StoreError),
}

/// Current choice on each dashboard dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub agency: AgencyFilter,
    pub service: ServiceFilter,
    pub robot: RobotSelection,
    pub month: MonthKey,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerOptions {
    /// Only offer robots (and agencies) that appear in the reporting slots
    pub restrict_to_reported_agencies: bool,
}

/// Aggregate for the current selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum DashboardAggregate {
    Robot(RobotAggregate),
    All(AllRobotsAggregate),
}

impl DashboardAggregate {
    pub fn is_no_data(&self) -> bool {
        match self {
            Self::Robot(a) => a.chart.is_no_data(),
            Self::All(a) => a.chart.is_no_data(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotOption {
    /// `None` for the "all robots" entry
    pub key: Option<RobotKey>,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthOption {
    pub key: MonthKey,
    pub label: &'static str,
    pub year_month: YearMonth,
}

/// Everything the dashboard page renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub state: ControllerState,
    pub user: Option<UserRecord>,
    pub selection: Selection,
    pub agencies: Vec<SelectOption>,
    pub services: Vec<SelectOption>,
    pub robots: Vec<RobotOption>,
    pub months: Vec<MonthOption>,
    pub aggregate: Option<DashboardAggregate>,
    pub no_data_message: Option<&'static str>,
    pub last_error: Option<String>,
}

pub struct ViewController {
    store: Arc<DataStore>,
    options: ControllerOptions,
    state: ControllerState,
    user: Option<UserRecord>,
    selection: Selection,
    /// Robots matching the agency and service filters, sentinel excluded
    robots: Vec<Program>,
    /// Services offered for the current agency, sentinel excluded
    services: Vec<String>,
    /// Set by an explicit service choice; skips one services recompute
    service_guard: bool,
    aggregate: Option<DashboardAggregate>,
    last_error: Option<String>,
}

impl ViewController {
    pub fn new(store: Arc<DataStore>, options: ControllerOptions) -> Self {
        Self {
            store,
            options,
            state: ControllerState::NotAuthenticated,
            user: None,
            selection: Selection::default(),
            robots: Vec::new(),
            services: Vec::new(),
            service_guard: false,
            aggregate: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }

    pub fn aggregate(&self) -> Option<&DashboardAggregate> {
        self.aggregate.as_ref()
    }

    pub fn robots(&self) -> &[Program] {
        &self.robots
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Bind the controller to an authenticated user.
    pub fn start(&mut self, user: UserRecord) -> Result<(), ControllerError> {
        if user.id.trim().is_empty() {
            return Err(ControllerError::MissingUserId);
        }
        if self.state == ControllerState::Ready {
            self.store.reset();
        }
        debug!(user = %user.name, "Controller started");
        self.user = Some(user);
        self.state = ControllerState::LoadingReferenceData;
        self.last_error = None;
        Ok(())
    }

    /// Populate the caches and apply the default selection.
    pub async fn load(
        &mut self,
        gateway: &dyn QueryGateway,
        today: NaiveDate,
    ) -> Result<(), ControllerError> {
        match self.state {
            ControllerState::NotAuthenticated => {
                return Err(ControllerError::InvalidState(self.state));
            }
            ControllerState::Ready => {
                self.store.reset();
                self.state = ControllerState::LoadingReferenceData;
            }
            ControllerState::LoadingReferenceData => {}
        }

        match load_caches(&self.store, gateway, today).await {
            Ok(epoch) => {
                self.selection = Selection::default();
                self.service_guard = false;
                self.state = ControllerState::Ready;
                self.last_error = None;
                self.refresh_lists();
                self.recompute();
                info!(epoch, robots = self.robots.len(), "Dashboard ready");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Dashboard load failed");
                self.state = ControllerState::NotAuthenticated;
                self.last_error = Some(err.to_string());
                self.aggregate = None;
                Err(err.into())
            }
        }
    }

    /// Drop cached data and return to the unauthenticated state. Loads in
    /// flight on the same store are discarded.
    pub fn reset(&mut self) {
        self.store.reset();
        self.state = ControllerState::NotAuthenticated;
        self.user = None;
        self.selection = Selection::default();
        self.robots.clear();
        self.services.clear();
        self.service_guard = false;
        self.aggregate = None;
        self.last_error = None;
    }

    pub fn select_agency(&mut self, agency: AgencyFilter) -> Result<(), ControllerError> {
        self.ensure_ready()?;
        if let AgencyFilter::Code(code) = &agency {
            let snapshot = self.store.snapshot();
            if !self.visible_agencies(&snapshot).iter().any(|a| &a.code == code) {
                return Err(ControllerError::UnknownAgency(code.clone()));
            }
        }
        debug!(agency = agency.as_str(), "Agency selected");
        self.selection.agency = agency;
        self.refresh_lists();
        self.recompute();
        Ok(())
    }

    pub fn select_service(&mut self, service: ServiceFilter) -> Result<(), ControllerError> {
        self.ensure_ready()?;
        debug!(service = service.as_str(), "Service selected");
        self.selection.service = service;
        self.service_guard = true;
        self.refresh_lists();
        self.recompute();
        Ok(())
    }

    pub fn select_robot(&mut self, robot: RobotSelection) -> Result<(), ControllerError> {
        self.ensure_ready()?;
        if let RobotSelection::One(key) = &robot {
            if !self.robots.iter().any(|p| &p.key() == key) {
                return Err(ControllerError::UnknownRobot(key.clone()));
            }
        }
        self.selection.robot = robot;
        self.refresh_lists();
        self.recompute();
        Ok(())
    }

    pub fn select_month(&mut self, month: MonthKey) -> Result<(), ControllerError> {
        self.ensure_ready()?;
        self.selection.month = month;
        self.recompute();
        Ok(())
    }

    /// Run several selection changes as one update. When `apply` fails the
    /// selection, filtered lists and aggregate are restored.
    pub fn with_rollback<T, E>(
        &mut self,
        apply: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let selection = self.selection.clone();
        let robots = self.robots.clone();
        let services = self.services.clone();
        let service_guard = self.service_guard;
        let aggregate = self.aggregate.clone();

        let result = apply(self);
        if result.is_err() {
            debug!("Selection update rejected, restoring previous selection");
            self.selection = selection;
            self.robots = robots;
            self.services = services;
            self.service_guard = service_guard;
            self.aggregate = aggregate;
        }
        result
    }

    pub fn view(&self) -> DashboardView {
        let snapshot = self.store.snapshot();

        let sentinel = |label: &str| SelectOption {
            value: ALL_SENTINEL.to_string(),
            label: label.to_string(),
        };
        let mut agencies = vec![sentinel("Toutes les agences")];
        agencies.extend(self.visible_agencies(&snapshot).into_iter().map(|a| SelectOption {
            label: a.display_name().to_string(),
            value: a.code,
        }));

        let mut services = vec![sentinel("Tous les services")];
        services.extend(self.services.iter().map(|s| SelectOption {
            value: s.clone(),
            label: s.clone(),
        }));

        let mut robots = vec![RobotOption {
            key: None,
            label: "Tous les robots".to_string(),
        }];
        robots.extend(self.robots.iter().map(|p| RobotOption {
            key: Some(p.key()),
            label: p.robot.clone(),
        }));

        let months = snapshot
            .reporting
            .as_ref()
            .map(|r| {
                r.slots()
                    .iter()
                    .map(|s| MonthOption {
                        key: s.key,
                        label: s.label,
                        year_month: s.year_month,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let no_data_message = self
            .aggregate
            .as_ref()
            .filter(|a| a.is_no_data())
            .map(|_| NO_DATA_MESSAGE);

        DashboardView {
            state: self.state,
            user: self.user.clone(),
            selection: self.selection.clone(),
            agencies,
            services,
            robots,
            months,
            aggregate: self.aggregate.clone(),
            no_data_message,
            last_error: self.last_error.clone(),
        }
    }

    fn ensure_ready(&self) -> Result<(), ControllerError> {
        if self.state == ControllerState::Ready {
            Ok(())
        } else {
            Err(ControllerError::InvalidState(self.state))
        }
    }

    fn visible_agencies(&self, snapshot: &StoreSnapshot) -> Vec<Agency> {
        let mut agencies = match &self.user {
            Some(user) => snapshot.reference.agencies_for_user(user),
            None => Vec::new(),
        };
        if self.options.restrict_to_reported_agencies {
            if let Some(reporting) = snapshot.reporting.as_ref() {
                let reported = reporting.reported_agencies();
                agencies.retain(|a| reported.contains(a.code.as_str()));
            }
        }
        agencies
    }

    /// Robots the user may see, before agency/service filtering.
    fn base_robots(&self, snapshot: &StoreSnapshot) -> Vec<Program> {
        let robots = match (self.options.restrict_to_reported_agencies, &snapshot.reporting) {
            (true, Some(reporting)) => snapshot.reference.robots_for_reported_agencies(reporting),
            _ => snapshot.reference.robots.clone(),
        };
        match &self.user {
            Some(user) => robots
                .into_iter()
                .filter(|p| user.may_see_agency(&p.agency))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Recompute services and robots for the current agency and service.
    fn refresh_lists(&mut self) {
        let snapshot = self.store.snapshot();
        let base = self.base_robots(&snapshot);

        if self.service_guard {
            self.service_guard = false;
        } else {
            let in_agency = ReferenceData::robots_by_agency_and_service(
                &base,
                &self.selection.agency,
                &ServiceFilter::All,
            );
            self.services = ReferenceData::services_for(&in_agency);
            if let ServiceFilter::Named(name) = &self.selection.service {
                let name = name.to_lowercase();
                if !self.services.iter().any(|s| s.to_lowercase() == name) {
                    debug!(service = %name, "Selected service no longer available");
                    self.selection.service = ServiceFilter::All;
                }
            }
        }

        self.robots = ReferenceData::robots_by_agency_and_service(
            &base,
            &self.selection.agency,
            &self.selection.service,
        );

        if let RobotSelection::One(key) = &self.selection.robot {
            if !self.robots.iter().any(|p| &p.key() == key) {
                debug!(robot = %key, "Selected robot filtered out");
                self.selection.robot = RobotSelection::All;
            }
        }
    }

    fn recompute(&mut self) {
        let snapshot = self.store.snapshot();
        let month = self.selection.month;
        let aggregate = match &self.selection.robot {
            RobotSelection::All => Some(DashboardAggregate::All(aggregator::aggregate_all(
                &snapshot,
                &self.robots,
                month,
            ))),
            RobotSelection::One(key) => self
                .robots
                .iter()
                .find(|p| &p.key() == key)
                .map(|p| DashboardAggregate::Robot(aggregator::aggregate_robot(&snapshot, p, month))),
        };
        self.aggregate = aggregate;
    }
}

/// Agencies, robots, services, then reporting, each awaited in turn.
async fn load_caches(
    store: &DataStore,
    gateway: &dyn QueryGateway,
    today: NaiveDate,
) -> Result<u64, StoreError> {
    let load = store.begin_load(gateway);
    load.load_all_agencies().await?;
    load.load_all_robots().await?;
    load.load_all_services().await?;
    load.initialize_reporting_data(today).await?;
    Ok(load.ticket())
}
