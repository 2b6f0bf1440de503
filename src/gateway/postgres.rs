//! PostgreSQL gateway
//!
//! Rows are returned as `to_jsonb(row)` objects so the upper layers see the
//! same untyped shape as the in-memory gateway. Column names are lowercase;
//! [`RowExt`](crate::types::RowExt) lookups are case-insensitive.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use super::{GatewayError, QueryGateway, Table, TableQuery, WriteRequest};
use crate::types::{RawRow, StoredUser, DAYS_IN_SERIES};

/// Create a PostgreSQL connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Run database migrations from the migrations/ directory
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Migrations complete");
    Ok(())
}

/// Gateway backed by a sqlx pool.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn rows(&self, sql: &str, binds: &[Option<&str>]) -> Result<Vec<RawRow>, GatewayError> {
        let mut query = sqlx::query_scalar::<_, Value>(sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        let values = query.fetch_all(&self.pool).await?;
        Ok(values.into_iter().filter_map(into_row).collect())
    }
}

fn into_row(value: Value) -> Option<RawRow> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[async_trait]
impl QueryGateway for PgGateway {
    async fn fetch(&self, query: &TableQuery) -> Result<Vec<RawRow>, GatewayError> {
        let filter = &query.filter;
        debug!(table = %query.table, ?filter, "Gateway fetch");

        match query.table {
            Table::Reporting => {
                let year_month = filter.year_month.map(|ym| ym.to_int());
                let values = sqlx::query_scalar::<_, Value>(
                    "SELECT to_jsonb(r) FROM reporting r \
                     WHERE ($1::text IS NULL OR r.clef = $1) \
                       AND ($2::int IS NULL OR r.annee_mois = $2) \
                     ORDER BY r.agence, r.nom_robot",
                )
                .bind(filter.clef.as_deref())
                .bind(year_month)
                .fetch_all(&self.pool)
                .await?;
                Ok(values.into_iter().filter_map(into_row).collect())
            }
            Table::Citations => {
                self.rows(
                    "SELECT to_jsonb(c) FROM citations c ORDER BY random() LIMIT 1",
                    &[],
                )
                .await
            }
            Table::Services => {
                self.rows("SELECT to_jsonb(s) FROM services s ORDER BY s.nom_service", &[])
                    .await
            }
            Table::Statuts => {
                self.rows("SELECT to_jsonb(s) FROM statuts s ORDER BY s.numero", &[])
                    .await
            }
            Table::AgencesV2 => {
                self.rows(
                    "SELECT to_jsonb(a) FROM agences a \
                     WHERE ($1::text IS NULL OR a.code_agence = $1) \
                     ORDER BY a.code_agence",
                    &[filter.agency_name.as_deref()],
                )
                .await
            }
            Table::Evolutions => {
                if let Some(robot) = filter.robot.as_deref() {
                    self.rows(
                        "SELECT to_jsonb(e) FROM evolutions e WHERE e.robot = $1 ORDER BY e.id",
                        &[Some(robot)],
                    )
                    .await
                } else if let Some(agency) = filter.agency.as_deref() {
                    self.rows(
                        "SELECT to_jsonb(e) FROM evolutions e \
                         WHERE e.robot IN ( \
                             SELECT DISTINCT r.nom_robot FROM reporting r WHERE r.agence = $1 \
                         ) ORDER BY e.id",
                        &[Some(agency)],
                    )
                    .await
                } else {
                    self.rows("SELECT to_jsonb(e) FROM evolutions e ORDER BY e.id", &[])
                        .await
                }
            }
            Table::BaremReporting => {
                self.rows(
                    "SELECT to_jsonb(b) FROM barem_reporting b ORDER BY b.agence, b.nom_robot",
                    &[],
                )
                .await
            }
        }
    }

    async fn insert(&self, request: WriteRequest) -> Result<(), GatewayError> {
        match request {
            WriteRequest::Reporting(row) => {
                let day_columns: Vec<String> =
                    (1..=DAYS_IN_SERIES).map(|d| format!("jour{d}")).collect();
                let day_params: Vec<String> =
                    (0..DAYS_IN_SERIES).map(|i| format!("${}", i + 8)).collect();
                let sql = format!(
                    "INSERT INTO reporting \
                     (clef, nom_robot, agence, description, date_maj, type_unite, annee_mois, {}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, {})",
                    day_columns.join(", "),
                    day_params.join(", ")
                );

                let mut query = sqlx::query(&sql)
                    .bind(row.clef())
                    .bind(&row.robot)
                    .bind(&row.agency)
                    .bind(row.description.as_deref())
                    .bind(row.updated_at)
                    .bind(row.unit_type.as_deref())
                    .bind(row.year_month.to_int());
                for value in row.day_values() {
                    query = query.bind(value);
                }
                query.execute(&self.pool).await?;
                info!(robot = %row.robot, agency = %row.agency, year_month = %row.year_month, "Reporting row inserted");
                Ok(())
            }
            WriteRequest::Evolution(req) => {
                sqlx::query(
                    "INSERT INTO evolutions \
                     (id, intitule, description, date_maj, nb_operations_mensuelles, robot, \
                      statut, temps_consomme, type_demande, type_gain, validateur) \
                     VALUES (COALESCE($1, nextval(pg_get_serial_sequence('evolutions', 'id'))), \
                             $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                )
                .bind(req.id)
                .bind(&req.title)
                .bind(&req.description)
                .bind(req.updated_at.as_deref())
                .bind(&req.monthly_operations)
                .bind(&req.robot)
                .bind(&req.status)
                .bind(&req.consumed_time)
                .bind(req.request_type.as_str())
                .bind(&req.gain_type)
                .bind(req.validator.as_deref())
                .execute(&self.pool)
                .await?;
                info!(robot = %req.robot, request_type = req.request_type.as_str(), "Evolution request inserted");
                Ok(())
            }
        }
    }

    async fn find_user(&self, name: &str) -> Result<Option<StoredUser>, GatewayError> {
        let value = sqlx::query_scalar::<_, Value>(
            "SELECT to_jsonb(u) FROM utilisateurs u WHERE u.user_name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value
            .and_then(into_row)
            .and_then(|row| StoredUser::from_row(&row)))
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
