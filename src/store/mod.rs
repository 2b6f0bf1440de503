//! Per-session data store
//!
//! Holds the reference data and the four reporting slots of one session as
//! an immutable [`StoreSnapshot`] behind an atomic pointer. Readers take an
//! `Arc` snapshot; loaders publish a new snapshot per completed step.
//!
//! Every load is tied to the epoch it started in. [`DataStore::reset`] bumps
//! the epoch, so a load still in flight when the session is reset cannot
//! publish into the new epoch: its commit fails with [`StoreError::Stale`].

pub mod reference;
pub mod reporting;

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, QueryGateway, Table, TableQuery};
use crate::types::{MonthKey, YearMonth};

pub use reference::ReferenceData;
pub use reporting::{reporting_months, ReportingData, ReportingSlot};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("fetch failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("load from epoch {ticket} discarded, store is at epoch {current}")]
    Stale { ticket: u64, current: u64 },
}

/// Immutable view of a session's caches.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub epoch: u64,
    pub reference: ReferenceData,
    /// `None` until reporting initialization completed
    pub reporting: Option<ReportingData>,
}

impl StoreSnapshot {
    fn empty(epoch: u64) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }

    /// Slot of `key`, when reporting is loaded.
    pub fn get_reporting_data(&self, key: MonthKey) -> Option<&ReportingSlot> {
        self.reporting.as_ref().map(|r| r.get_reporting_data(key))
    }
}

/// Owner of the current snapshot.
pub struct DataStore {
    current: ArcSwap<StoreSnapshot>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(StoreSnapshot::empty(0)),
        }
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.current.load_full()
    }

    pub fn epoch(&self) -> u64 {
        self.current.load().epoch
    }

    /// Drop all cached data and invalidate loads in flight.
    pub fn reset(&self) -> u64 {
        let prev = self
            .current
            .rcu(|prev| Arc::new(StoreSnapshot::empty(prev.epoch + 1)));
        let epoch = prev.epoch + 1;
        debug!(epoch, "Data store reset");
        epoch
    }

    /// Start a load bound to the current epoch.
    pub fn begin_load<'a>(&'a self, gateway: &'a dyn QueryGateway) -> LoadSession<'a> {
        LoadSession {
            store: self,
            gateway,
            ticket: self.epoch(),
        }
    }

    /// Apply `update` to a copy of the snapshot if it is still at `ticket`.
    fn commit<F>(&self, ticket: u64, update: F) -> Result<(), StoreError>
    where
        F: Fn(&mut StoreSnapshot),
    {
        let prev = self.current.rcu(|prev| {
            if prev.epoch == ticket {
                let mut next = StoreSnapshot::clone(prev);
                update(&mut next);
                Arc::new(next)
            } else {
                Arc::clone(prev)
            }
        });
        if prev.epoch == ticket {
            Ok(())
        } else {
            warn!(ticket, current = prev.epoch, "Discarding stale load");
            Err(StoreError::Stale {
                ticket,
                current: prev.epoch,
            })
        }
    }
}

/// A sequence of cache loads sharing one epoch ticket.
pub struct LoadSession<'a> {
    store: &'a DataStore,
    gateway: &'a dyn QueryGateway,
    ticket: u64,
}

impl LoadSession<'_> {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Replace the agency list. Returns the number of agencies loaded.
    pub async fn load_all_agencies(&self) -> Result<usize, StoreError> {
        let rows = self.gateway.fetch(&TableQuery::new(Table::AgencesV2)).await?;
        let agencies = ReferenceData::map_agencies(&rows);
        let count = agencies.len();
        self.store
            .commit(self.ticket, |s| s.reference.agencies = agencies.clone())?;
        info!(count, "Agencies loaded");
        Ok(count)
    }

    /// Replace the robot list. Agency labels come from the agencies already
    /// in the store.
    pub async fn load_all_robots(&self) -> Result<usize, StoreError> {
        let rows = self
            .gateway
            .fetch(&TableQuery::new(Table::BaremReporting))
            .await?;
        let agencies = self.store.snapshot().reference.agencies.clone();
        if agencies.is_empty() {
            debug!("Robots loaded before agencies, labels left empty");
        }
        let robots = ReferenceData::map_robots(&rows, &agencies);
        let count = robots.len();
        self.store
            .commit(self.ticket, |s| s.reference.robots = robots.clone())?;
        info!(count, "Robots loaded");
        Ok(count)
    }

    pub async fn load_all_services(&self) -> Result<usize, StoreError> {
        let rows = self.gateway.fetch(&TableQuery::new(Table::Services)).await?;
        let services = ReferenceData::map_services(&rows);
        let count = services.len();
        self.store
            .commit(self.ticket, |s| s.reference.services = services.clone())?;
        info!(count, "Services loaded");
        Ok(count)
    }

    /// Fetch the four reporting months one after the other and publish them
    /// together. Any failed fetch aborts without touching the store.
    pub async fn initialize_reporting_data(&self, today: NaiveDate) -> Result<(), StoreError> {
        let [n, n1, n2, n3] = reporting_months(today);
        let slots = [
            self.fetch_month(n).await?,
            self.fetch_month(n1).await?,
            self.fetch_month(n2).await?,
            self.fetch_month(n3).await?,
        ];
        let data = ReportingData::new(slots);
        self.store
            .commit(self.ticket, |s| s.reporting = Some(data.clone()))?;
        info!("Reporting data initialized");
        Ok(())
    }

    async fn fetch_month(
        &self,
        (key, year_month): (MonthKey, YearMonth),
    ) -> Result<ReportingSlot, StoreError> {
        let rows = self
            .gateway
            .fetch(&TableQuery::reporting_month(year_month))
            .await?;
        let slot = ReportingSlot::from_rows(key, year_month, &rows);
        debug!(month = %key, %year_month, rows = slot.len(), "Reporting month fetched");
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::types::RobotKey;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    async fn gateway() -> MemoryGateway {
        let g = MemoryGateway::new();
        g.seed(
            Table::AgencesV2,
            [json!({"CODE_AGENCE": "A", "LIBELLE_AGENCE": "Agence A"})],
        )
        .await;
        g.seed(
            Table::BaremReporting,
            [
                json!({"AGENCE": "A", "NOM_ROBOT": "R1", "SERVICE": "S"}),
                json!({"AGENCE": "A", "NOM_ROBOT": "TOUT"}),
            ],
        )
        .await;
        g.seed(Table::Services, [json!({"NOM_SERVICE": "S"})]).await;
        g.seed(
            Table::Reporting,
            [
                json!({"AGENCE": "A", "NOM_ROBOT": "R1", "ANNEE_MOIS": 202610, "JOUR1": 4}),
                json!({"AGENCE": "A", "NOM_ROBOT": "R1", "ANNEE_MOIS": 202607, "JOUR1": 1}),
            ],
        )
        .await;
        g
    }

    #[tokio::test]
    async fn test_full_load_populates_snapshot() {
        let g = gateway().await;
        let store = DataStore::new();
        let load = store.begin_load(&g);
        load.load_all_agencies().await.unwrap();
        load.load_all_robots().await.unwrap();
        load.load_all_services().await.unwrap();
        load.initialize_reporting_data(today()).await.unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.reference.robots.len(), 1);
        assert_eq!(
            snap.reference.robots[0].agency_label.as_deref(),
            Some("Agence A")
        );
        let n = snap.get_reporting_data(MonthKey::N).unwrap();
        assert_eq!(n.year_month, YearMonth::new(2026, 10).unwrap());
        assert!(n.entry(&RobotKey::new("A", "R1")).is_some());
        let n3 = snap.get_reporting_data(MonthKey::NMinus3).unwrap();
        assert_eq!(n3.label, "Juillet");
        assert_eq!(n3.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_month_leaves_reporting_unset() {
        let g = gateway().await;
        g.fail_month(YearMonth::new(2026, 8).unwrap(), "boom");
        let store = DataStore::new();
        let err = store
            .begin_load(&g)
            .initialize_reporting_data(today())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Gateway(_)));
        assert!(store.snapshot().reporting.is_none());
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_load() {
        let g = gateway().await;
        let store = DataStore::new();
        let load = store.begin_load(&g);
        load.load_all_agencies().await.unwrap();

        store.reset();
        let err = load.load_all_robots().await.unwrap_err();
        assert!(matches!(err, StoreError::Stale { ticket: 0, current: 1 }));

        let snap = store.snapshot();
        assert_eq!(snap.epoch, 1);
        assert!(snap.reference.agencies.is_empty());
        assert!(snap.reference.robots.is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_are_immutable_for_readers() {
        let g = gateway().await;
        let store = DataStore::new();
        let before = store.snapshot();
        store.begin_load(&g).load_all_agencies().await.unwrap();
        assert!(before.reference.agencies.is_empty());
        assert_eq!(store.snapshot().reference.agencies.len(), 1);
    }
}
