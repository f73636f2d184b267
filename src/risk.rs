// Per-comuna risk score and the safety index derived from it.
//
// risk   = total * 0.3 + avg_severity * 10 + critical * 2
// safety = 100 - risk / max_risk * 100
//
// Scores are kept unrounded in ComunaRisk and only rounded when the output
// rows are built. The safety index needs the maximum over every scored
// comuna, so it is a separate pass over the finished scores.

use crate::aggregate::GroupAggregate;
use crate::types::{RiskRow, SafetyRow};
use crate::util::round_to;
use std::cmp::Ordering;

pub const VOLUME_WEIGHT: f64 = 0.3;
pub const SEVERITY_WEIGHT: f64 = 10.0;
pub const CRITICAL_WEIGHT: f64 = 2.0;

pub fn risk_score(total_incidents: usize, avg_severity: f64, critical_incidents: usize) -> f64 {
    total_incidents as f64 * VOLUME_WEIGHT
        + avg_severity * SEVERITY_WEIGHT
        + critical_incidents as f64 * CRITICAL_WEIGHT
}

/// Unrounded risk of one comuna.
#[derive(Debug, Clone, PartialEq)]
pub struct ComunaRisk {
    pub comuna: String,
    pub total_incidents: usize,
    pub avg_severity: f64,
    pub critical_incidents: usize,
    pub risk_score: f64,
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Score every by-comuna group, highest risk first. Ties break on comuna.
pub fn score_comunas(groups: &[GroupAggregate<String>]) -> Vec<ComunaRisk> {
    let mut scored: Vec<ComunaRisk> = groups
        .iter()
        .map(|g| ComunaRisk {
            comuna: g.key.clone(),
            total_incidents: g.count,
            avg_severity: g.avg_severity,
            critical_incidents: g.critical_count,
            risk_score: risk_score(g.count, g.avg_severity, g.critical_count),
        })
        .collect();
    scored.sort_by(|a, b| by_score_desc(a.risk_score, b.risk_score).then_with(|| a.comuna.cmp(&b.comuna)));
    scored
}

pub fn risk_ranking(scored: &[ComunaRisk]) -> Vec<RiskRow> {
    scored
        .iter()
        .map(|c| RiskRow {
            comuna: c.comuna.clone(),
            total_incidents: c.total_incidents,
            avg_severity: round_to(c.avg_severity, 2),
            critical_incidents: c.critical_incidents,
            risk_score: round_to(c.risk_score, 2),
        })
        .collect()
}

/// Safety index per comuna, safest first.
///
/// The comuna with the highest risk gets 0 and a comuna with zero risk gets
/// 100. Negative risk (from negative severities) is capped at 100. When the
/// maximum is not positive every comuna gets 100.
pub fn safety_index(scored: &[ComunaRisk]) -> Vec<SafetyRow> {
    let max_risk = scored
        .iter()
        .map(|r| r.risk_score)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut rows: Vec<(f64, SafetyRow)> = scored
        .iter()
        .map(|r| {
            let index = if max_risk > 0.0 {
                (100.0 - (r.risk_score / max_risk) * 100.0).min(100.0)
            } else {
                100.0
            };
            let row = SafetyRow {
                comuna: r.comuna.clone(),
                risk_score: round_to(r.risk_score, 2),
                safety_index: round_to(index, 2),
            };
            (index, row)
        })
        .collect();
    rows.sort_by(|(a, ra), (b, rb)| by_score_desc(*a, *b).then_with(|| ra.comuna.cmp(&rb.comuna)));
    rows.into_iter().map(|(_, row)| row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, total: usize, avg: f64, critical: usize) -> GroupAggregate<String> {
        GroupAggregate {
            key: name.to_string(),
            count: total,
            avg_severity: avg,
            max_severity: 0,
            critical_count: critical,
            distinct_comunas: None,
        }
    }

    #[test]
    fn weighted_formula() {
        assert!((risk_score(10, 5.0, 3) - 59.0).abs() < 1e-9);
        assert_eq!(risk_score(0, 0.0, 0), 0.0);
    }

    #[test]
    fn ranking_is_descending() {
        let scored = score_comunas(&[group("Low", 20, 1.0, 0), group("High", 5, 8.0, 4)]);
        let rows = risk_ranking(&scored);
        assert_eq!(rows[0].comuna, "High");
        assert_eq!(rows[0].risk_score, 89.5);
        assert_eq!(rows[1].risk_score, 16.0);
    }

    #[test]
    fn score_uses_unrounded_mean() {
        // severities 1, 1, 2: mean 1.333.., risk 0.9 + 13.333.. = 14.233..
        let scored = score_comunas(&[group("X", 3, 4.0 / 3.0, 0)]);
        let rows = risk_ranking(&scored);
        assert_eq!(rows[0].avg_severity, 1.33);
        assert_eq!(rows[0].risk_score, 14.23);
    }

    #[test]
    fn safety_bounds() {
        let scored = score_comunas(&[
            group("A", 10, 5.0, 3),
            group("B", 5, 2.5, 0),
            group("Z", 0, 0.0, 0),
        ]);
        let rows = safety_index(&scored);
        let get = |name: &str| rows.iter().find(|r| r.comuna == name).unwrap().safety_index;
        assert_eq!(get("A"), 0.0);
        assert_eq!(get("Z"), 100.0);
        // B: risk 26.5 of 59
        assert_eq!(get("B"), 55.08);
        assert!(rows.iter().all(|r| r.safety_index <= 100.0));
        assert_eq!(rows[0].comuna, "Z");
    }

    #[test]
    fn negative_risk_is_capped() {
        let scored = score_comunas(&[group("A", 2, 5.0, 0), group("Neg", 1, -3.0, 0)]);
        let rows = safety_index(&scored);
        let neg = rows.iter().find(|r| r.comuna == "Neg").unwrap();
        assert_eq!(neg.risk_score, -29.7);
        assert_eq!(neg.safety_index, 100.0);
        assert!(rows.iter().all(|r| r.safety_index <= 100.0));
    }

    #[test]
    fn no_positive_max_falls_back() {
        let rows = safety_index(&score_comunas(&[group("A", 0, 0.0, 0)]));
        assert_eq!(rows[0].safety_index, 100.0);
        assert!(safety_index(&[]).is_empty());
    }
}
