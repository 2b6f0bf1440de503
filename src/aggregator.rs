//! Aggregation of reporting data for the dashboard widgets
//!
//! Pure functions over a [`StoreSnapshot`]. Every figure shown to the user
//! is the raw unit count multiplied by the robot's unit factor (1 for
//! count-based robots, minutes per unit for time-based ones); raw counts are
//! carried alongside for tooltips.
//!
//! The "all robots" day series and the four month widgets are computed
//! separately but from the same membership set, so the widget of the
//! selected month always equals the series' month-to-date.

use std::collections::HashMap;

use serde::Serialize;

use crate::store::{ReportingSlot, StoreSnapshot};
use crate::types::{
    GainType, MonthKey, Program, ReportingEntry, RobotKey, UnitType, YearMonth, DAYS_IN_SERIES,
};

/// Message shown when the selection has no reporting row.
pub const NO_DATA_MESSAGE: &str = "Aucune donnée disponible";

// ============================================================================
// Output Types
// ============================================================================

/// One bar of the day chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayPoint {
    /// 1-based day of month
    pub day: u32,
    /// `DD/MM/YYYY`
    pub label: String,
    /// Converted value (raw units × unit factor)
    pub value: f64,
    pub raw_units: f64,
}

/// 31-point day series of one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySeries {
    pub year_month: YearMonth,
    pub points: Vec<DayPoint>,
    /// Converted month-to-date
    pub month_to_date: f64,
    pub raw_month_to_date: f64,
    pub display: String,
}

/// Chart content: a series, or the "no data" state.
///
/// `NoData` is a normal outcome of a selection without reporting rows and
/// is distinct from a failed load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartData {
    Series(DaySeries),
    NoData { message: &'static str },
}

impl ChartData {
    pub fn no_data() -> Self {
        Self::NoData {
            message: NO_DATA_MESSAGE,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }

    pub fn series(&self) -> Option<&DaySeries> {
        match self {
            Self::Series(s) => Some(s),
            Self::NoData { .. } => None,
        }
    }
}

/// One of the four month widgets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotal {
    pub key: MonthKey,
    pub label: &'static str,
    pub year_month: YearMonth,
    pub value: f64,
    pub display: String,
}

/// Descriptive fields of the selected robot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotDetail {
    pub agency: String,
    pub agency_label: Option<String>,
    pub robot: String,
    pub service: Option<String>,
    pub unit_type: UnitType,
    pub gain_type: GainType,
    pub unit_factor: f64,
    pub description: Option<String>,
    pub problem: Option<String>,
    pub long_description: Option<String>,
    pub outcome: Option<String>,
    pub validator: Option<String>,
    pub validated: Option<String>,
    pub updated_at: Option<String>,
}

impl From<&Program> for RobotDetail {
    fn from(p: &Program) -> Self {
        Self {
            agency: p.agency.clone(),
            agency_label: p.agency_label.clone(),
            robot: p.robot.clone(),
            service: p.service.clone(),
            unit_type: p.unit_type,
            gain_type: p.gain_type,
            unit_factor: p.unit_factor(),
            description: p.description.clone(),
            problem: p.problem.clone(),
            long_description: p.long_description.clone(),
            outcome: p.outcome.clone(),
            validator: p.validator.clone(),
            validated: p.validated.clone(),
            updated_at: p.updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotAggregate {
    pub month: MonthKey,
    pub detail: RobotDetail,
    pub chart: ChartData,
    pub month_totals: Vec<MonthTotal>,
}

/// Converted month-to-date of the "all robots" aggregate, split by what
/// each robot saves.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GainBreakdown {
    /// Sum for robots whose gain is time
    pub time: f64,
    /// Sum for robots whose gain is manual operations
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllRobotsAggregate {
    pub month: MonthKey,
    /// Robots in the filtered list
    pub member_count: usize,
    /// Members with a reporting row in the selected month
    pub contributing: usize,
    pub chart: ChartData,
    pub gains: GainBreakdown,
    pub month_totals: Vec<MonthTotal>,
}

// ============================================================================
// Aggregation
// ============================================================================

/// Day series, detail and month widgets for one robot.
pub fn aggregate_robot(
    snapshot: &StoreSnapshot,
    program: &Program,
    month: MonthKey,
) -> RobotAggregate {
    let key = program.key();
    let factor = program.unit_factor();

    let chart = snapshot
        .get_reporting_data(month)
        .and_then(|slot| slot.entry(&key).map(|entry| (slot, entry)))
        .map_or_else(ChartData::no_data, |(slot, entry)| {
            let mut acc = SeriesAccumulator::new(slot.year_month);
            acc.add(entry, factor);
            acc.finish()
        });

    let members = HashMap::from([(key, factor)]);
    RobotAggregate {
        month,
        detail: RobotDetail::from(program),
        chart,
        month_totals: month_totals(snapshot, &members),
    }
}

/// Summed series over every member robot, with the month widgets computed
/// over the same membership.
pub fn aggregate_all(
    snapshot: &StoreSnapshot,
    members: &[Program],
    month: MonthKey,
) -> AllRobotsAggregate {
    let membership = membership(members);
    let gain_types: HashMap<RobotKey, GainType> =
        members.iter().map(|p| (p.key(), p.gain_type)).collect();

    let mut gains = GainBreakdown::default();
    let mut contributing = 0;
    let chart = match snapshot.get_reporting_data(month) {
        Some(slot) => {
            let mut acc = SeriesAccumulator::new(slot.year_month);
            for (key, entry) in member_entries(slot, &membership) {
                let factor = membership[key];
                acc.add(entry, factor);
                contributing += 1;
                match gain_types.get(key).copied().unwrap_or_default() {
                    GainType::Time => gains.time += entry.month_to_date * factor,
                    GainType::Count => gains.count += entry.month_to_date * factor,
                }
            }
            if contributing == 0 {
                ChartData::no_data()
            } else {
                acc.finish()
            }
        }
        None => ChartData::no_data(),
    };

    AllRobotsAggregate {
        month,
        member_count: members.len(),
        contributing,
        chart,
        gains,
        month_totals: month_totals(snapshot, &membership),
    }
}

/// The four month widgets for a membership set (robot key → unit factor).
/// Robots without a row in a month contribute 0 to that month.
pub fn month_totals(snapshot: &StoreSnapshot, members: &HashMap<RobotKey, f64>) -> Vec<MonthTotal> {
    let Some(reporting) = snapshot.reporting.as_ref() else {
        return Vec::new();
    };
    reporting
        .slots()
        .iter()
        .map(|slot| {
            let value: f64 = member_entries(slot, members)
                .map(|(key, entry)| entry.month_to_date * members[key])
                .sum();
            MonthTotal {
                key: slot.key,
                label: slot.label,
                year_month: slot.year_month,
                value,
                display: format_number(value),
            }
        })
        .collect()
}

/// Robot key → unit factor for a robot list.
pub fn membership(members: &[Program]) -> HashMap<RobotKey, f64> {
    members.iter().map(|p| (p.key(), p.unit_factor())).collect()
}

/// Entries of `slot` whose robot is a member, in key order.
fn member_entries<'a>(
    slot: &'a ReportingSlot,
    members: &'a HashMap<RobotKey, f64>,
) -> impl Iterator<Item = (&'a RobotKey, &'a ReportingEntry)> + 'a {
    slot.entries
        .iter()
        .filter(move |(key, _)| members.contains_key(*key))
}

struct SeriesAccumulator {
    year_month: YearMonth,
    values: [f64; DAYS_IN_SERIES],
    raw: [f64; DAYS_IN_SERIES],
    month_to_date: f64,
    raw_month_to_date: f64,
}

impl SeriesAccumulator {
    fn new(year_month: YearMonth) -> Self {
        Self {
            year_month,
            values: [0.0; DAYS_IN_SERIES],
            raw: [0.0; DAYS_IN_SERIES],
            month_to_date: 0.0,
            raw_month_to_date: 0.0,
        }
    }

    fn add(&mut self, entry: &ReportingEntry, factor: f64) {
        for (idx, units) in entry.days.iter().enumerate() {
            self.values[idx] += units * factor;
            self.raw[idx] += units;
        }
        self.month_to_date += entry.month_to_date * factor;
        self.raw_month_to_date += entry.month_to_date;
    }

    fn finish(self) -> ChartData {
        let points = (0..DAYS_IN_SERIES)
            .map(|idx| DayPoint {
                day: idx as u32 + 1,
                label: self.year_month.day_label(idx + 1),
                value: self.values[idx],
                raw_units: self.raw[idx],
            })
            .collect();
        ChartData::Series(DaySeries {
            year_month: self.year_month,
            points,
            month_to_date: self.month_to_date,
            raw_month_to_date: self.raw_month_to_date,
            display: format_number(self.month_to_date),
        })
    }
}

/// Widget display: integers as is, other values rounded to two decimals
/// and shown by their integer part.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let shown = if value.fract() == 0.0 {
        value
    } else {
        ((value * 100.0).round() / 100.0).trunc()
    };
    format!("{shown:.0}")
}
