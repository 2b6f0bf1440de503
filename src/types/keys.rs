//! Join keys and selection dimensions: RobotKey, MonthKey, YearMonth, filters

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Wire value of the "do not filter" sentinel for agency/service/robot.
pub const ALL_SENTINEL: &str = "ALL";

/// Legacy spelling of the sentinel still found in reference tables.
pub const LEGACY_ALL_SENTINEL: &str = "TOUT";

/// True when `value` is the sentinel under either spelling.
pub fn is_all_sentinel(value: &str) -> bool {
    let v = value.trim();
    v.eq_ignore_ascii_case(ALL_SENTINEL) || v.eq_ignore_ascii_case(LEGACY_ALL_SENTINEL)
}

// ============================================================================
// Robot Key
// ============================================================================

/// Composite identity of a robot: owning agency + robot name.
///
/// Replaces the `AGENCE_ROBOT` string concatenation used as a join key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RobotKey {
    pub agency: String,
    pub robot: String,
}

impl RobotKey {
    pub fn new(agency: impl Into<String>, robot: impl Into<String>) -> Self {
        Self {
            agency: agency.into(),
            robot: robot.into(),
        }
    }

    /// Parse the legacy `AGENCY_ROBOT` form. Agency codes may themselves
    /// contain underscores (`BBL_CARGO`), so the candidate agencies are
    /// tried longest first.
    pub fn parse_legacy<'a>(
        value: &str,
        known_agencies: impl IntoIterator<Item = &'a str>,
    ) -> Option<Self> {
        let mut agencies: Vec<&str> = known_agencies.into_iter().collect();
        agencies.sort_by_key(|a| std::cmp::Reverse(a.len()));
        agencies.into_iter().find_map(|agency| {
            value
                .strip_prefix(agency)
                .and_then(|rest| rest.strip_prefix('_'))
                .filter(|robot| !robot.is_empty())
                .map(|robot| Self::new(agency, robot))
        })
    }
}

impl std::fmt::Display for RobotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.agency, self.robot)
    }
}

// ============================================================================
// Year-Month
// ============================================================================

/// Calendar month, encoded on the wire and in the database as `YYYYMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    /// 1..=12
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month whose data is "current" on `today`.
    ///
    /// On the 1st the in-progress month is still empty, so the previous
    /// calendar month is reported instead.
    pub fn reporting_month(today: NaiveDate) -> Self {
        let month = Self::of(today);
        if today.day() == 1 {
            month.previous()
        } else {
            month
        }
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Walk back `n` months.
    pub fn back(self, n: u32) -> Self {
        (0..n).fold(self, |ym, _| ym.previous())
    }

    pub fn to_int(self) -> i32 {
        self.year * 100 + self.month as i32
    }

    pub fn from_int(value: i64) -> Option<Self> {
        let year = i32::try_from(value / 100).ok()?;
        let month = u32::try_from(value % 100).ok()?;
        Self::new(year, month)
    }

    /// French month name, as shown on the month widgets.
    pub fn french_label(self) -> &'static str {
        FRENCH_MONTHS[(self.month as usize).saturating_sub(1) % 12]
    }

    /// `DD/MM/YYYY` label for a day of this month (day is 1-based).
    pub fn day_label(self, day: usize) -> String {
        format!("{:02}/{:02}/{}", day, self.month, self.year)
    }
}

const FRENCH_MONTHS: [&str; 12] = [
    "Janvier",
    "Février",
    "Mars",
    "Avril",
    "Mai",
    "Juin",
    "Juillet",
    "Août",
    "Septembre",
    "Octobre",
    "Novembre",
    "Décembre",
];

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.to_int())
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::from_int(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid YYYYMM value: {raw}")))
    }
}

// ============================================================================
// Month Key
// ============================================================================

/// Month offset selected on the dashboard: current month and three prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MonthKey {
    #[default]
    N,
    NMinus1,
    NMinus2,
    NMinus3,
}

impl MonthKey {
    pub const ALL: [Self; 4] = [Self::N, Self::NMinus1, Self::NMinus2, Self::NMinus3];

    /// Lenient parse: anything unrecognized resolves to `N`.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "N-1" => Self::NMinus1,
            "N-2" => Self::NMinus2,
            "N-3" => Self::NMinus3,
            _ => Self::N,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::N => "N",
            Self::NMinus1 => "N-1",
            Self::NMinus2 => "N-2",
            Self::NMinus3 => "N-3",
        }
    }

    /// Slot index in the reporting cache (0 = current month).
    pub fn offset(self) -> usize {
        match self {
            Self::N => 0,
            Self::NMinus1 => 1,
            Self::NMinus2 => 2,
            Self::NMinus3 => 3,
        }
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MonthKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

// ============================================================================
// Selection Filters
// ============================================================================

/// Agency dimension of the selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AgencyFilter {
    #[default]
    All,
    Code(String),
}

impl AgencyFilter {
    pub fn parse(value: &str) -> Self {
        if value.trim().is_empty() || is_all_sentinel(value) {
            Self::All
        } else {
            Self::Code(value.trim().to_string())
        }
    }

    pub fn matches(&self, agency: &str) -> bool {
        match self {
            Self::All => true,
            Self::Code(code) => code == agency,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => ALL_SENTINEL,
            Self::Code(code) => code,
        }
    }
}

/// Service dimension of the selection. Matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServiceFilter {
    #[default]
    All,
    Named(String),
}

impl ServiceFilter {
    pub fn parse(value: &str) -> Self {
        if value.trim().is_empty() || is_all_sentinel(value) {
            Self::All
        } else {
            Self::Named(value.trim().to_string())
        }
    }

    pub fn matches(&self, service: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Named(name) => service.is_some_and(|s| s.to_lowercase() == name.to_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => ALL_SENTINEL,
            Self::Named(name) => name,
        }
    }
}

/// Robot dimension of the selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RobotSelection {
    /// Synthetic aggregate over every robot of the filtered list.
    #[default]
    All,
    One(RobotKey),
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok(Self::parse(&raw))
            }
        }
    };
}

string_serde!(AgencyFilter);
string_serde!(ServiceFilter);

impl Serialize for RobotSelection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str(ALL_SENTINEL),
            Self::One(key) => key.serialize(serializer),
        }
    }
}
