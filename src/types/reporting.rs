//! Monthly reporting rows: one per (agency, robot, month)

use serde::{Deserialize, Serialize};

use super::keys::{RobotKey, YearMonth};
use super::reference::UnitType;
use super::row::{RawRow, RowExt};

/// Number of day counters carried by a reporting row.
pub const DAYS_IN_SERIES: usize = 31;

const MONTH_TO_DATE_COLUMNS: &[&str] = &[
    "NB_UNITES_DEPUIS_DEBUT_DU_MOIS",
    "NB UNITES DEPUIS DEBUT DU MOIS",
];

/// Reporting counters for one robot over one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportingEntry {
    pub key: RobotKey,
    pub year_month: YearMonth,
    /// Raw units since the start of the month
    pub month_to_date: f64,
    /// Raw units per day, index 0 = day 1. Missing days are 0.
    pub days: [f64; DAYS_IN_SERIES],
    pub unit_type: UnitType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ReportingEntry {
    /// Map a `Reporting` row fetched for `expected` month.
    ///
    /// Day counters are read from `JOUR1`..`JOUR31`; when a row carries none
    /// of those columns, `DD/MM/YYYY` keys of its own month are used instead.
    /// Rows with an empty month-to-date column get the sum of their days.
    pub fn from_row(row: &RawRow, expected: YearMonth) -> Option<Self> {
        let agency = row.text(&["AGENCE"])?;
        let robot = row.text(&["NOM_ROBOT", "NOM_PROGRAMME", "NOM PROGRAMME"])?;
        let year_month = row
            .integer(&["ANNEE_MOIS"])
            .and_then(YearMonth::from_int)
            .unwrap_or(expected);

        let has_day_columns = (1..=DAYS_IN_SERIES)
            .any(|day| row.lookup(&[day_column(day).as_str()]).is_some());

        let mut days = [0.0; DAYS_IN_SERIES];
        for (idx, slot) in days.iter_mut().enumerate() {
            let day = idx + 1;
            let column = if has_day_columns {
                day_column(day)
            } else {
                year_month.day_label(day)
            };
            *slot = row.number(&[column.as_str()]).max(0.0);
        }

        let month_to_date = if row.text(MONTH_TO_DATE_COLUMNS).is_some() {
            row.number(MONTH_TO_DATE_COLUMNS).max(0.0)
        } else {
            days.iter().sum()
        };

        Some(Self {
            key: RobotKey::new(agency, robot),
            year_month,
            month_to_date,
            days,
            unit_type: UnitType::parse(&row.text(&["TYPE_UNITE"]).unwrap_or_default()),
            description: row.text(&["DESCRIPTION"]),
            updated_at: row.text(&["DATE_MAJ"]),
        })
    }
}

/// `JOURn` column name for a 1-based day.
pub fn day_column(day: usize) -> String {
    format!("JOUR{day}")
}

/// Payload accepted by the gateway for an insert into `Reporting`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReportingRow {
    #[serde(rename = "CLEF", default)]
    pub key: Option<String>,
    #[serde(rename = "NOM_ROBOT")]
    pub robot: String,
    #[serde(rename = "AGENCE")]
    pub agency: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: Option<String>,
    #[serde(rename = "DATE_MAJ", default)]
    pub updated_at: Option<chrono::NaiveDate>,
    #[serde(rename = "TYPE_UNITE", default)]
    pub unit_type: Option<String>,
    #[serde(rename = "ANNEE_MOIS")]
    pub year_month: YearMonth,
    /// `JOUR1`..`JOUR31`, flattened from the payload
    #[serde(flatten)]
    pub days: std::collections::BTreeMap<String, serde_json::Value>,
}

impl NewReportingRow {
    /// Day counters as integers; missing or non-numeric days are 0.
    pub fn day_values(&self) -> [i32; DAYS_IN_SERIES] {
        let mut out = [0; DAYS_IN_SERIES];
        for (idx, slot) in out.iter_mut().enumerate() {
            let column = day_column(idx + 1);
            let value = self
                .days
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(&column))
                .map_or(0.0, |(_, v)| super::row::value_as_f64(v));
            *slot = value.max(0.0).round() as i32;
        }
        out
    }

    /// Legacy `CLEF` value (`AGENCE_ROBOT`) when the payload omits it.
    pub fn clef(&self) -> String {
        self.key
            .clone()
            .unwrap_or_else(|| RobotKey::new(&self.agency, &self.robot).to_string())
    }
}
