//! Reference data: agencies, robots and services

use std::collections::BTreeSet;

use serde::Serialize;

use super::reporting::ReportingData;
use crate::types::{
    is_all_sentinel, Agency, AgencyFilter, Program, RawRow, RowExt, ServiceFilter, UserRecord,
};

/// Agencies, robots and services of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceData {
    /// Sorted by code, unique codes
    pub agencies: Vec<Agency>,
    /// Sentinel rows removed
    pub robots: Vec<Program>,
    /// Distinct, sorted
    pub services: Vec<String>,
}

impl ReferenceData {
    pub(crate) fn map_agencies(rows: &[RawRow]) -> Vec<Agency> {
        let mut agencies: Vec<Agency> = rows
            .iter()
            .filter_map(Agency::from_row)
            .filter(|a| !is_all_sentinel(&a.code))
            .collect();
        agencies.sort_by(|a, b| a.code.cmp(&b.code));
        agencies.dedup_by(|a, b| a.code == b.code);
        agencies
    }

    /// Map robot rows, dropping literal sentinels and labelling each robot
    /// with its agency's display name when that agency is known.
    pub(crate) fn map_robots(rows: &[RawRow], agencies: &[Agency]) -> Vec<Program> {
        rows.iter()
            .filter_map(Program::from_row)
            .filter(|p| !p.is_sentinel())
            .map(|mut p| {
                p.agency_label = agencies
                    .iter()
                    .find(|a| a.code == p.agency)
                    .and_then(|a| a.label.clone());
                p
            })
            .collect()
    }

    pub(crate) fn map_services(rows: &[RawRow]) -> Vec<String> {
        rows.iter()
            .filter_map(|r| r.text(&["NOM_SERVICE", "SERVICE"]))
            .filter(|s| !is_all_sentinel(s))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn agency(&self, code: &str) -> Option<&Agency> {
        self.agencies.iter().find(|a| a.code == code)
    }

    /// Agencies visible to `user`: all of them for all-agency users,
    /// otherwise only the listed codes.
    pub fn agencies_for_user(&self, user: &UserRecord) -> Vec<Agency> {
        self.agencies
            .iter()
            .filter(|a| user.may_see_agency(&a.code))
            .cloned()
            .collect()
    }

    /// Robots whose agency appears in at least one reporting slot.
    pub fn robots_for_reported_agencies(&self, reporting: &ReportingData) -> Vec<Program> {
        let reported = reporting.reported_agencies();
        self.robots
            .iter()
            .filter(|p| reported.contains(p.agency.as_str()))
            .cloned()
            .collect()
    }

    /// Robots matching both filters, sorted by robot name then agency.
    pub fn robots_by_agency_and_service(
        robots: &[Program],
        agency: &AgencyFilter,
        service: &ServiceFilter,
    ) -> Vec<Program> {
        let mut out: Vec<Program> = robots
            .iter()
            .filter(|p| agency.matches(&p.agency))
            .filter(|p| service.matches(p.service.as_deref()))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.robot.cmp(&b.robot).then_with(|| a.agency.cmp(&b.agency)));
        out
    }

    /// Distinct services of `robots` (case-insensitive), sorted. The
    /// sentinel is not included.
    pub fn services_for(robots: &[Program]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        robots
            .iter()
            .filter_map(|p| p.service.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|s| seen.insert(s.to_lowercase()))
            .collect()
    }
}
