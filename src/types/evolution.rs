//! Evolution requests, statuses and quotes

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::row::{RawRow, RowExt};

/// Maximum length of an evolution title (`INTITULE` column width).
pub const MAX_TITLE_CHARS: usize = 50;

/// History rows kept per robot when no robot or agency filter is applied.
pub const RECENT_PER_ROBOT: usize = 5;

/// Status label shown for a status number missing from `Statuts`.
pub const UNKNOWN_STATUS_LABEL: &str = "Statut inconnu";

/// Status number given to newly submitted requests.
pub const DEFAULT_STATUS: &str = "1";

// ============================================================================
// Request Type
// ============================================================================

/// Kind of request submitted from the evolution form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// A robot that does not exist yet
    New,
    /// Change to an existing robot
    #[default]
    Evolution,
    /// Edit of a previous request, stored as a new row
    Edit,
}

impl RequestType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "new" | "nouveau" | "creation" => Self::New,
            "edit" | "edition" => Self::Edit,
            _ => Self::Evolution,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Evolution => "evolution",
            Self::Edit => "edit",
        }
    }
}

// ============================================================================
// Submitted Request
// ============================================================================

/// Rejected evolution payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title is required")]
    MissingTitle,
    #[error("title exceeds 50 characters ({0})")]
    TitleTooLong(usize),
    #[error("robot is required")]
    MissingRobot,
}

/// Evolution request as submitted by a user. Field names follow the
/// `Evolutions` table columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionRequest {
    /// Explicit identifier; assigned by the store when absent. Cleared on
    /// edits, which always get a fresh row.
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "INTITULE", default)]
    pub title: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
    #[serde(rename = "ROBOT", default)]
    pub robot: String,
    #[serde(rename = "NB_OPERATIONS_MENSUELLES", default)]
    pub monthly_operations: String,
    #[serde(rename = "TEMPS_CONSOMME", default)]
    pub consumed_time: String,
    #[serde(rename = "STATUT", default = "default_status")]
    pub status: String,
    #[serde(rename = "TYPE_DEMANDE", default)]
    pub request_type: RequestType,
    #[serde(rename = "TYPE_GAIN", default)]
    pub gain_type: String,
    /// Submission date as text; today (`DD/MM/YYYY`) when absent
    #[serde(rename = "DATE_MAJ", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(rename = "VALIDATEUR", default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

impl EvolutionRequest {
    /// Trim fields, enforce required values and fill the date.
    pub fn normalized(mut self, today: NaiveDate) -> Result<Self, ValidationError> {
        self.title = self.title.trim().to_string();
        self.robot = self.robot.trim().to_string();
        self.monthly_operations = self.monthly_operations.trim().to_string();
        self.consumed_time = self.consumed_time.trim().to_string();
        self.status = match self.status.trim() {
            "" => default_status(),
            s => s.to_string(),
        };

        if self.title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        let len = self.title.chars().count();
        if len > MAX_TITLE_CHARS {
            return Err(ValidationError::TitleTooLong(len));
        }
        if self.robot.is_empty() {
            return Err(ValidationError::MissingRobot);
        }

        if self.request_type == RequestType::Edit {
            self.id = None;
        }
        if self.updated_at.as_deref().map_or(true, |d| d.trim().is_empty()) {
            self.updated_at = Some(today.format("%d/%m/%Y").to_string());
        }
        Ok(self)
    }
}

// ============================================================================
// Stored Record
// ============================================================================

/// One row of the `Evolutions` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionRecord {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub robot: String,
    pub monthly_operations: String,
    pub consumed_time: String,
    pub status: String,
    pub request_type: RequestType,
    pub gain_type: String,
    pub updated_at: Option<String>,
    pub validator: Option<String>,
}

impl EvolutionRecord {
    pub fn from_row(row: &RawRow) -> Option<Self> {
        Some(Self {
            id: row.integer(&["ID"]).unwrap_or_default(),
            title: row.text(&["INTITULE"]).unwrap_or_default(),
            description: row.text(&["DESCRIPTION"]).unwrap_or_default(),
            robot: row.text(&["ROBOT"])?,
            monthly_operations: row.text(&["NB_OPERATIONS_MENSUELLES"]).unwrap_or_default(),
            consumed_time: row.text(&["TEMPS_CONSOMME"]).unwrap_or_default(),
            status: row.text(&["STATUT"]).unwrap_or_else(default_status),
            request_type: RequestType::parse(&row.text(&["TYPE_DEMANDE"]).unwrap_or_default()),
            gain_type: row.text(&["TYPE_GAIN"]).unwrap_or_default(),
            updated_at: row.text(&["DATE_MAJ"]),
            validator: row.text(&["VALIDATEUR"]),
        })
    }

    fn updated_on(&self) -> Option<NaiveDate> {
        self.updated_at.as_deref().and_then(parse_loose_date)
    }
}

/// History table line, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionHistoryRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub robot: String,
    pub status: String,
    pub status_label: String,
    /// Monthly operations, or consumed time when operations are empty
    pub gain: String,
    /// `"temps"` when the gain column shows consumed time, `"autre"` otherwise
    pub gain_kind: &'static str,
    pub request_type: RequestType,
    /// `DD/MM/YYYY`, empty when unknown
    pub requested_on: String,
}

/// Build the history list shown under the charts.
///
/// Rows are ordered most recent first. When `limit_per_robot` is set only
/// that many rows per robot are kept.
pub fn build_history(
    mut records: Vec<EvolutionRecord>,
    statuses: &[Status],
    limit_per_robot: Option<usize>,
) -> Vec<EvolutionHistoryRow> {
    let labels: HashMap<&str, &str> = statuses
        .iter()
        .map(|s| (s.number.as_str(), s.label.as_str()))
        .collect();

    records.sort_by(|a, b| {
        b.updated_on()
            .cmp(&a.updated_on())
            .then_with(|| b.id.cmp(&a.id))
    });

    let mut per_robot: HashMap<String, usize> = HashMap::new();
    records
        .into_iter()
        .filter(|r| match limit_per_robot {
            Some(limit) => {
                let seen = per_robot.entry(r.robot.clone()).or_insert(0);
                *seen += 1;
                *seen <= limit
            }
            None => true,
        })
        .map(|r| {
            let status_label = labels
                .get(r.status.trim())
                .map_or(UNKNOWN_STATUS_LABEL, |l| *l)
                .to_string();
            let (gain, gain_kind) = if r.monthly_operations.is_empty() {
                (r.consumed_time.clone(), "temps")
            } else {
                (r.monthly_operations.clone(), "autre")
            };
            EvolutionHistoryRow {
                requested_on: r
                    .updated_on()
                    .map(|d| d.format("%d/%m/%Y").to_string())
                    .unwrap_or_default(),
                id: r.id,
                title: r.title,
                description: r.description,
                robot: r.robot,
                status: r.status,
                status_label,
                gain,
                gain_kind,
                request_type: r.request_type,
            }
        })
        .collect()
}

/// Accepts ISO dates, RFC 3339 timestamps and `DD/MM/YYYY`.
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

// ============================================================================
// Statuses and Quotes
// ============================================================================

/// Entry of the `Statuts` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub number: String,
    pub label: String,
}

impl Status {
    pub fn from_row(row: &RawRow) -> Option<Self> {
        Some(Self {
            number: row.text(&["NUMERO"])?,
            label: row.text(&["LABEL"])?,
        })
    }
}

/// Quote shown on the login page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub citation: String,
    #[serde(rename = "auteur")]
    pub author: String,
}

impl Quote {
    pub fn from_row(row: &RawRow) -> Option<Self> {
        Some(Self {
            id: row.text(&["ID"])?,
            citation: row.text(&["CITATION"])?,
            author: row.text(&["AUTEUR"]).unwrap_or_default(),
        })
    }
}
