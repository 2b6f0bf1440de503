//! In-process gateway for tests and `--demo` mode

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock as StdRwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::{GatewayError, QueryGateway, Table, TableQuery, WriteRequest};
use crate::types::{day_column, RawRow, RowExt, StoredUser, YearMonth, DAYS_IN_SERIES};

/// Tables held as plain row vectors, filtered the way the SQL gateway does.
#[derive(Default)]
pub struct MemoryGateway {
    tables: RwLock<HashMap<Table, Vec<RawRow>>>,
    users: RwLock<Vec<RawRow>>,
    /// Tables whose reads fail with the given message
    failures: DashMap<Table, String>,
    /// Reporting months whose reads fail
    month_failures: DashMap<YearMonth, String>,
    /// Failure returned by user lookups
    user_failure: StdRwLock<Option<String>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to a table. Non-object values are ignored.
    pub async fn seed(&self, table: Table, rows: impl IntoIterator<Item = Value>) {
        let mut tables = self.tables.write().await;
        let target = tables.entry(table).or_default();
        target.extend(rows.into_iter().filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        }));
    }

    /// Register a login. `agency_ids` may contain `TOUTES`.
    pub async fn add_user(
        &self,
        id: i64,
        name: &str,
        password_hash: &str,
        agency_ids: &[&str],
        service: Option<&str>,
    ) {
        let row = json!({
            "ID": id,
            "USER_NAME": name,
            "EMAIL": format!("{name}@example.org"),
            "USER_SERVICE": service,
            "USER_AGENCE_IDS": agency_ids.join(","),
            "PASSWORD_HASH": password_hash,
        });
        if let Value::Object(map) = row {
            self.users.write().await.push(map);
        }
    }

    /// Make every read of `table` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_table(&self, table: Table, message: &str) {
        self.failures.insert(table, message.to_string());
    }

    /// Make reporting reads for one month fail.
    pub fn fail_month(&self, year_month: YearMonth, message: &str) {
        self.month_failures.insert(year_month, message.to_string());
    }

    /// Make user lookups fail.
    pub fn fail_users(&self, message: &str) {
        *self.user_failure.write().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
        self.month_failures.clear();
        *self.user_failure.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn row_count(&self, table: Table) -> usize {
        self.tables.read().await.get(&table).map_or(0, Vec::len)
    }

    /// Populated gateway used by `--demo`: three agencies, five robots and
    /// four months of reporting ending at the reporting month of `today`.
    pub async fn demo(today: NaiveDate, password_hash: &str) -> Self {
        let gateway = Self::new();
        gateway
            .seed(
                Table::AgencesV2,
                [
                    json!({"CODE_AGENCE": "BBLPAU", "LIBELLE_AGENCE": "Pau"}),
                    json!({"CODE_AGENCE": "BBLLIL", "LIBELLE_AGENCE": "Lille"}),
                    json!({"CODE_AGENCE": "TIF69", "LIBELLE_AGENCE": "Lyon"}),
                ],
            )
            .await;
        gateway
            .seed(
                Table::Services,
                ["Comptabilité", "Exploitation", "Ressources humaines"]
                    .into_iter()
                    .map(|s| json!({"NOM_SERVICE": s})),
            )
            .await;
        gateway
            .seed(
                Table::Statuts,
                [
                    json!({"NUMERO": "1", "LABEL": "En attente"}),
                    json!({"NUMERO": "2", "LABEL": "En cours"}),
                    json!({"NUMERO": "3", "LABEL": "Terminé"}),
                ],
            )
            .await;
        gateway
            .seed(
                Table::Citations,
                [
                    json!({"ID": 1, "CITATION": "Le temps, c'est de l'argent.", "AUTEUR": "Benjamin Franklin"}),
                    json!({"ID": 2, "CITATION": "La simplicité est la sophistication suprême.", "AUTEUR": "Léonard de Vinci"}),
                ],
            )
            .await;

        let robots = [
            ("BBLPAU", "Factures", "Comptabilité", "temps", "2,5"),
            ("BBLPAU", "Relances", "Comptabilité", "nombre", "0"),
            ("BBLLIL", "Pointage", "Ressources humaines", "temps", "1"),
            ("BBLLIL", "Tournees", "Exploitation", "nombre", "0"),
            ("TIF69", "Douane", "Exploitation", "temps", "4"),
        ];
        gateway
            .seed(
                Table::BaremReporting,
                robots.iter().map(|(agency, robot, service, unit, tpu)| {
                    json!({
                        "AGENCE": agency,
                        "NOM_ROBOT": robot,
                        "SERVICE": service,
                        "TYPE_UNITE": unit,
                        "TEMPS_PAR_UNITE": tpu,
                        "TYPE_GAIN": if *unit == "temps" { "temps" } else { "nombre" },
                        "DESCRIPTION": format!("Automatisation {robot}"),
                    })
                }),
            )
            .await;

        let current = YearMonth::reporting_month(today);
        let mut reporting = Vec::new();
        for back in 0..4u32 {
            let ym = current.back(back);
            for (idx, (agency, robot, _, unit, _)) in robots.iter().enumerate() {
                let mut row = serde_json::Map::new();
                row.insert("AGENCE".into(), json!(agency));
                row.insert("NOM_ROBOT".into(), json!(robot));
                row.insert("TYPE_UNITE".into(), json!(unit));
                row.insert("ANNEE_MOIS".into(), json!(ym.to_int()));
                let mut total = 0_u64;
                for day in 1..=DAYS_IN_SERIES {
                    let count = ((day * (idx + 2) + back as usize * 3) % 11) as u64;
                    total += count;
                    row.insert(day_column(day), json!(count));
                }
                row.insert("NB_UNITES_DEPUIS_DEBUT_DU_MOIS".into(), json!(total.to_string()));
                reporting.push(Value::Object(row));
            }
        }
        gateway.seed(Table::Reporting, reporting).await;

        gateway
            .seed(
                Table::Evolutions,
                [json!({
                    "ID": 1,
                    "INTITULE": "Export mensuel",
                    "DESCRIPTION": "Ajouter un export CSV",
                    "ROBOT": "Factures",
                    "STATUT": "2",
                    "NB_OPERATIONS_MENSUELLES": "",
                    "TEMPS_CONSOMME": "45",
                    "TYPE_DEMANDE": "evolution",
                    "DATE_MAJ": today.format("%d/%m/%Y").to_string(),
                })],
            )
            .await;

        gateway
            .add_user(1, "demo", password_hash, &["TOUTES"], Some("Comptabilité"))
            .await;
        gateway
    }

    fn check_failure(&self, query: &TableQuery) -> Result<(), GatewayError> {
        if let Some(msg) = self.failures.get(&query.table) {
            return Err(GatewayError::Database(msg.clone()));
        }
        if let Some(ym) = query.filter.year_month {
            if let Some(msg) = self.month_failures.get(&ym) {
                return Err(GatewayError::Database(msg.clone()));
            }
        }
        Ok(())
    }
}

fn text_eq(row: &RawRow, columns: &[&str], expected: &str) -> bool {
    row.text(columns).is_some_and(|v| v == expected)
}

#[async_trait]
impl QueryGateway for MemoryGateway {
    async fn fetch(&self, query: &TableQuery) -> Result<Vec<RawRow>, GatewayError> {
        self.check_failure(query)?;
        let filter = &query.filter;
        let tables = self.tables.read().await;
        let rows = tables.get(&query.table).cloned().unwrap_or_default();
        debug!(table = %query.table, rows = rows.len(), "Memory gateway fetch");

        let out = match query.table {
            Table::Reporting => rows
                .into_iter()
                .filter(|r| {
                    filter.clef.as_deref().map_or(true, |clef| {
                        let stored = r.text(&["CLEF"]).or_else(|| {
                            let agency = r.text(&["AGENCE"])?;
                            let robot = r.text(&["NOM_ROBOT"])?;
                            Some(format!("{agency}_{robot}"))
                        });
                        stored.as_deref() == Some(clef)
                    })
                })
                .filter(|r| {
                    filter.year_month.map_or(true, |ym| {
                        r.integer(&["ANNEE_MOIS"]) == Some(i64::from(ym.to_int()))
                    })
                })
                .collect(),
            Table::Citations => rows
                .choose(&mut rand::thread_rng())
                .cloned()
                .into_iter()
                .collect(),
            Table::AgencesV2 => rows
                .into_iter()
                .filter(|r| {
                    filter
                        .agency_name
                        .as_deref()
                        .map_or(true, |code| text_eq(r, &["CODE_AGENCE"], code))
                })
                .collect(),
            Table::Evolutions => {
                if let Some(robot) = filter.robot.as_deref() {
                    rows.into_iter()
                        .filter(|r| text_eq(r, &["ROBOT"], robot))
                        .collect()
                } else if let Some(agency) = filter.agency.as_deref() {
                    let members: HashSet<String> = tables
                        .get(&Table::Reporting)
                        .into_iter()
                        .flatten()
                        .filter(|r| text_eq(r, &["AGENCE"], agency))
                        .filter_map(|r| r.text(&["NOM_ROBOT"]))
                        .collect();
                    rows.into_iter()
                        .filter(|r| r.text(&["ROBOT"]).is_some_and(|name| members.contains(&name)))
                        .collect()
                } else {
                    rows
                }
            }
            Table::Services | Table::Statuts | Table::BaremReporting => rows,
        };
        Ok(out)
    }

    async fn insert(&self, request: WriteRequest) -> Result<(), GatewayError> {
        let table = request.table();
        let row = match request {
            WriteRequest::Reporting(row) => {
                let mut map = serde_json::Map::new();
                map.insert("CLEF".into(), json!(row.clef()));
                map.insert("NOM_ROBOT".into(), json!(row.robot));
                map.insert("AGENCE".into(), json!(row.agency));
                map.insert("DESCRIPTION".into(), json!(row.description));
                map.insert("DATE_MAJ".into(), json!(row.updated_at));
                map.insert("TYPE_UNITE".into(), json!(row.unit_type));
                map.insert("ANNEE_MOIS".into(), json!(row.year_month.to_int()));
                for (idx, value) in row.day_values().iter().enumerate() {
                    map.insert(day_column(idx + 1), json!(value));
                }
                map
            }
            WriteRequest::Evolution(mut req) => {
                let mut tables = self.tables.write().await;
                let existing = tables.entry(Table::Evolutions).or_default();
                match req.id {
                    Some(id) if existing.iter().any(|r| r.integer(&["ID"]) == Some(id)) => {
                        return Err(GatewayError::Database(format!(
                            "duplicate key value violates unique constraint \"evolutions_pkey\" (id={id})"
                        )));
                    }
                    Some(_) => {}
                    None => {
                        let next = existing
                            .iter()
                            .filter_map(|r| r.integer(&["ID"]))
                            .max()
                            .unwrap_or(0)
                            + 1;
                        req.id = Some(next);
                    }
                }
                let value = serde_json::to_value(&req).map_err(|e| GatewayError::InvalidPayload {
                    table,
                    reason: e.to_string(),
                })?;
                if let Value::Object(map) = value {
                    existing.push(map);
                }
                return Ok(());
            }
        };
        self.tables.write().await.entry(table).or_default().push(row);
        Ok(())
    }

    async fn find_user(&self, name: &str) -> Result<Option<StoredUser>, GatewayError> {
        let failure = self
            .user_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(msg) = failure {
            return Err(GatewayError::Database(msg));
        }
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|r| text_eq(r, &["USER_NAME"], name))
            .and_then(StoredUser::from_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayFilter;
    use crate::types::EvolutionRequest;

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    async fn gateway() -> MemoryGateway {
        let g = MemoryGateway::new();
        g.seed(
            Table::Reporting,
            [
                json!({"AGENCE": "A", "NOM_ROBOT": "R1", "ANNEE_MOIS": 202610, "JOUR1": 1}),
                json!({"AGENCE": "A", "NOM_ROBOT": "R1", "ANNEE_MOIS": 202609, "JOUR1": 2}),
                json!({"AGENCE": "B", "NOM_ROBOT": "R2", "ANNEE_MOIS": 202610, "JOUR1": 3}),
            ],
        )
        .await;
        g.seed(
            Table::Evolutions,
            [
                json!({"ID": 1, "INTITULE": "x", "ROBOT": "R1"}),
                json!({"ID": 2, "INTITULE": "y", "ROBOT": "R2"}),
            ],
        )
        .await;
        g
    }

    #[tokio::test]
    async fn test_reporting_filtered_by_month_and_clef() {
        let g = gateway().await;
        let rows = g.fetch(&TableQuery::reporting_month(ym(2026, 10))).await.unwrap();
        assert_eq!(rows.len(), 2);

        let query = TableQuery::new(Table::Reporting).with_filter(GatewayFilter {
            clef: Some("A_R1".into()),
            ..GatewayFilter::default()
        });
        assert_eq!(g.fetch(&query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_evolutions_by_agency_uses_reporting_membership() {
        let g = gateway().await;
        let query = TableQuery::new(Table::Evolutions).with_filter(GatewayFilter {
            agency: Some("B".into()),
            ..GatewayFilter::default()
        });
        let rows = g.fetch(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text(&["ROBOT"]).as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_insert_evolution_assigns_next_id() {
        let g = gateway().await;
        let req: EvolutionRequest =
            serde_json::from_value(json!({"INTITULE": "z", "ROBOT": "R1"})).unwrap();
        g.insert(WriteRequest::Evolution(req)).await.unwrap();
        let rows = g.fetch(&TableQuery::new(Table::Evolutions)).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].integer(&["ID"]), Some(3));
    }

    #[tokio::test]
    async fn test_insert_evolution_rejects_duplicate_id() {
        let g = gateway().await;
        let req: EvolutionRequest =
            serde_json::from_value(json!({"ID": 1, "INTITULE": "z", "ROBOT": "R1"})).unwrap();
        let err = g.insert(WriteRequest::Evolution(req)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Database(ref m) if m.contains("duplicate key")));
        assert_eq!(g.row_count(Table::Evolutions).await, 2);
    }

    #[tokio::test]
    async fn test_injected_month_failure() {
        let g = gateway().await;
        g.fail_month(ym(2026, 9), "timeout");
        assert!(g.fetch(&TableQuery::reporting_month(ym(2026, 10))).await.is_ok());
        let err = g.fetch(&TableQuery::reporting_month(ym(2026, 9))).await.unwrap_err();
        assert!(matches!(err, GatewayError::Database(ref m) if m == "timeout"));
    }

    #[tokio::test]
    async fn test_citations_return_at_most_one_row() {
        let g = MemoryGateway::new();
        assert!(g.fetch(&TableQuery::new(Table::Citations)).await.unwrap().is_empty());
        g.seed(
            Table::Citations,
            [json!({"ID": 1, "CITATION": "a"}), json!({"ID": 2, "CITATION": "b"})],
        )
        .await;
        assert_eq!(g.fetch(&TableQuery::new(Table::Citations)).await.unwrap().len(), 1);
    }
}
