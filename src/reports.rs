// Named views over the enriched set and the summary reducer.

use crate::aggregate::{aggregate, sort_by_count_desc, GroupAggregate};
use crate::types::{
    ComunaRow, ComunaTypeHourRow, ComunaTypeRow, DayRow, EnrichedIncident, HourRow,
    SeverityCategory, SeverityDistributionRow, SummaryStats, TypeRow,
};
use crate::util::{mean, percentage, round_to};
use std::collections::HashSet;

/// By-comuna groups, unrounded, largest first. Shared by the comuna view and
/// the risk scorer.
pub fn comuna_groups(data: &[EnrichedIncident]) -> Vec<GroupAggregate<String>> {
    let mut groups = aggregate(data, |r| r.comuna.clone());
    sort_by_count_desc(&mut groups);
    groups
}

pub fn comuna_rows(groups: &[GroupAggregate<String>]) -> Vec<ComunaRow> {
    groups
        .iter()
        .map(|g| ComunaRow {
            comuna: g.key.clone(),
            total_incidents: g.count,
            avg_severity: round_to(g.avg_severity, 2),
            max_severity: g.max_severity,
            critical_incidents: g.critical_count,
        })
        .collect()
}

pub fn incidents_by_comuna(data: &[EnrichedIncident]) -> Vec<ComunaRow> {
    comuna_rows(&comuna_groups(data))
}

pub fn incidents_by_type(data: &[EnrichedIncident]) -> Vec<TypeRow> {
    let mut groups = aggregate(data, |r| r.type_canonical);
    sort_by_count_desc(&mut groups);
    groups
        .into_iter()
        .map(|g| TypeRow {
            incident_type: g.key,
            total_incidents: g.count,
            avg_severity: round_to(g.avg_severity, 2),
            max_severity: g.max_severity,
            critical_incidents: g.critical_count,
        })
        .collect()
}

/// Chronological: hours ascending, not by volume.
pub fn incidents_by_hour(data: &[EnrichedIncident]) -> Vec<HourRow> {
    aggregate(data, |r| r.hour.clone())
        .into_iter()
        .map(|g| HourRow {
            hour: g.key,
            total_incidents: g.count,
            avg_severity: round_to(g.avg_severity, 2),
            max_severity: g.max_severity,
            critical_incidents: g.critical_count,
        })
        .collect()
}

pub fn incidents_by_day(data: &[EnrichedIncident]) -> Vec<DayRow> {
    let mut groups = aggregate(data, |r| r.day.clone());
    sort_by_count_desc(&mut groups);
    groups
        .into_iter()
        .map(|g| DayRow {
            day: g.key,
            total_incidents: g.count,
            avg_severity: round_to(g.avg_severity, 2),
            max_severity: g.max_severity,
            critical_incidents: g.critical_count,
        })
        .collect()
}

pub fn comuna_type_analysis(data: &[EnrichedIncident]) -> Vec<ComunaTypeRow> {
    let mut groups = aggregate(data, |r| (r.comuna.clone(), r.type_canonical));
    sort_by_count_desc(&mut groups);
    groups
        .into_iter()
        .map(|g| ComunaTypeRow {
            comuna: g.key.0,
            incident_type: g.key.1,
            total_incidents: g.count,
            avg_severity: round_to(g.avg_severity, 2),
            max_severity: g.max_severity,
        })
        .collect()
}

/// (comuna, type, hour) groups with at least `min_group` incidents.
pub fn comuna_type_hour_analysis(data: &[EnrichedIncident], min_group: usize) -> Vec<ComunaTypeHourRow> {
    let mut groups = aggregate(data, |r| (r.comuna.clone(), r.type_canonical, r.hour.clone()));
    groups.retain(|g| g.count >= min_group);
    sort_by_count_desc(&mut groups);
    groups
        .into_iter()
        .map(|g| {
            let (comuna, incident_type, hour) = g.key;
            ComunaTypeHourRow {
                comuna,
                incident_type,
                hour,
                total_incidents: g.count,
                avg_severity: round_to(g.avg_severity, 2),
            }
        })
        .collect()
}

/// HIGH / MEDIUM / LOW counts with their share of all retained records.
pub fn severity_distribution(data: &[EnrichedIncident]) -> Vec<SeverityDistributionRow> {
    let total = data.len();
    let mut groups = aggregate(data, |r| r.severity_category);
    sort_by_count_desc(&mut groups);
    groups
        .into_iter()
        .map(|g| SeverityDistributionRow {
            severity_category: g.key,
            total_incidents: g.count,
            avg_severity: round_to(g.avg_severity, 2),
            percentage: round_to(percentage(g.count, total), 2),
        })
        .collect()
}

/// Single global reduction over the enriched set.
pub fn generate_summary(data: &[EnrichedIncident]) -> SummaryStats {
    let comunas: HashSet<&str> = data.iter().map(|r| r.comuna.as_str()).collect();
    let types: HashSet<_> = data.iter().map(|r| r.type_canonical).collect();
    let severity_sum: i64 = data.iter().map(|r| i64::from(r.severity())).sum();
    SummaryStats {
        total_incidents: data.len(),
        avg_severity: round_to(mean(severity_sum as f64, data.len()), 2),
        total_critical_incidents: data
            .iter()
            .filter(|r| r.severity_category == SeverityCategory::High)
            .count(),
        distinct_comunas: comunas.len(),
        distinct_incident_types: types.len(),
    }
}
