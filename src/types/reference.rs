//! Reference entities: agencies and robots (programs)

use serde::{Deserialize, Serialize};

use super::keys::{is_all_sentinel, RobotKey};
use super::row::{parse_decimal, RawRow, RowExt};

// ============================================================================
// Agency
// ============================================================================

/// An organizational branch that owns robots and reporting rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agency {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Agency {
    pub fn from_row(row: &RawRow) -> Option<Self> {
        Some(Self {
            code: row.text(&["CODE_AGENCE", "codeAgence"])?,
            label: row.text(&["LIBELLE_AGENCE", "libelleAgence"]),
        })
    }

    /// Label if present, code otherwise.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.code)
    }
}

// ============================================================================
// Unit and Gain Types
// ============================================================================

/// How a robot's counters are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Each unit saves `time_per_unit` minutes
    Time,
    /// Each unit is one manual operation avoided
    #[default]
    Count,
}

impl UnitType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "temps" | "time" => Self::Time,
            _ => Self::Count,
        }
    }
}

/// What a robot saves: elapsed time or manual operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GainType {
    Time,
    #[default]
    Count,
}

impl GainType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "temps" | "time" => Self::Time,
            _ => Self::Count,
        }
    }
}

// ============================================================================
// Program (Robot)
// ============================================================================

/// A named automated process whose executions are tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub agency: String,
    /// Agency display label, resolved through the agency cache at load time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_label: Option<String>,
    pub robot: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub unit_type: UnitType,
    /// Minutes per unit as stored (may use a decimal comma; "0" = not time-based)
    pub time_per_unit: String,
    pub gain_type: GainType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated: Option<String>,
}

impl Program {
    /// Map a reference-table row. Rows without agency or robot name are dropped.
    pub fn from_row(row: &RawRow) -> Option<Self> {
        let agency = row.text(&["AGENCE", "agence"])?;
        let robot = row.text(&["NOM_ROBOT", "NOM_PROGRAMME", "NOM PROGRAMME", "robot"])?;
        Some(Self {
            agency,
            agency_label: None,
            robot,
            service: row.text(&["SERVICE", "NOM_SERVICE"]),
            unit_type: UnitType::parse(&row.text(&["TYPE_UNITE"]).unwrap_or_default()),
            time_per_unit: row
                .text(&["TEMPS_PAR_UNITE"])
                .unwrap_or_else(|| "0".to_string()),
            gain_type: GainType::parse(&row.text(&["TYPE_GAIN"]).unwrap_or_default()),
            description: row.text(&["DESCRIPTION"]),
            problem: row.text(&["PROBLEME"]),
            long_description: row.text(&["DESCRIPTION_LONG"]),
            outcome: row.text(&["RESULTAT"]),
            updated_at: row.text(&["DATE_MAJ"]),
            validator: row.text(&["VALIDATEUR"]),
            validated: row.text(&["VALIDE_OUI_NON"]),
        })
    }

    pub fn key(&self) -> RobotKey {
        RobotKey::new(&self.agency, &self.robot)
    }

    /// Literal sentinel rows coming from the data source.
    pub fn is_sentinel(&self) -> bool {
        is_all_sentinel(&self.robot)
    }

    /// Parsed minutes per unit (decimal comma tolerated).
    pub fn minutes_per_unit(&self) -> f64 {
        parse_decimal(&self.time_per_unit)
    }

    /// Factor converting a raw unit count into the user-facing figure:
    /// 1 for count-based robots, minutes-per-unit for time-based ones.
    pub fn unit_factor(&self) -> f64 {
        let minutes = self.minutes_per_unit();
        if self.unit_type == UnitType::Time && minutes != 0.0 {
            minutes
        } else {
            1.0
        }
    }
}
