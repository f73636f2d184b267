// Enricher: derives temporal fields, canonical type, severity category and
// canonical comuna for each validated record.
use crate::config::{PipelineConfig, SeverityThresholds};
use crate::types::{EnrichedIncident, IncidentRecord, IncidentType, SeverityCategory};
use rayon::prelude::*;

/// Recognised type spellings. Anything else becomes `OTRO`.
const TYPE_TABLE: [(&str, IncidentType); 5] = [
    ("accidente", IncidentType::Accidente),
    ("atasco", IncidentType::Atasco),
    ("construccion", IncidentType::Construccion),
    ("peligro", IncidentType::Peligro),
    ("clima", IncidentType::Clima),
];

/// Map a raw type to its canonical token.
///
/// By default only the exact lower-case spellings match, so `"ACCIDENTE"`
/// falls through to `OTRO`; `case_insensitive` lifts that.
pub fn canonical_type(raw: &str, case_insensitive: bool) -> IncidentType {
    TYPE_TABLE
        .iter()
        .find(|(token, _)| {
            if case_insensitive {
                token.eq_ignore_ascii_case(raw)
            } else {
                *token == raw
            }
        })
        .map(|(_, t)| *t)
        .unwrap_or(IncidentType::Otro)
}

pub fn severity_category(severity: i32, t: &SeverityThresholds) -> SeverityCategory {
    if severity >= t.high {
        SeverityCategory::High
    } else if severity >= t.medium {
        SeverityCategory::Medium
    } else {
        SeverityCategory::Low
    }
}

fn canonical_comuna(comuna: &str, cfg: &PipelineConfig) -> String {
    cfg.comuna_aliases
        .get(&comuna.trim().to_lowercase())
        .cloned()
        .unwrap_or_else(|| comuna.to_string())
}

pub fn enrich_one(record: IncidentRecord, cfg: &PipelineConfig) -> EnrichedIncident {
    let type_canonical = canonical_type(&record.type_raw, cfg.case_insensitive_types);
    let ts = record.occurred_at;
    EnrichedIncident {
        comuna: canonical_comuna(&record.comuna, cfg),
        description: record
            .description
            .clone()
            .unwrap_or_else(|| format!("Incidente de tipo {}", type_canonical)),
        type_canonical,
        severity_category: severity_category(record.severity, &cfg.severity),
        hour: ts.format("%H").to_string(),
        day: ts.format("%Y-%m-%d").to_string(),
        month: ts.format("%m").to_string(),
        year: ts.format("%Y").to_string(),
        record,
    }
}

/// Enrich the whole deduplicated set. Output order follows input order.
pub fn enrich(records: Vec<IncidentRecord>, cfg: &PipelineConfig) -> Vec<EnrichedIncident> {
    let out: Vec<EnrichedIncident> = records
        .into_par_iter()
        .map(|r| enrich_one(r, cfg))
        .collect();
    log::info!("Enriched {} records", out.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::parse_timestamp;

    fn rec(type_raw: &str, comuna: &str, severity: i32, ts: &str) -> IncidentRecord {
        IncidentRecord {
            id: "x".to_string(),
            type_raw: type_raw.to_string(),
            description: None,
            latitude: -33.45,
            longitude: -70.66,
            street: None,
            city: None,
            comuna: comuna.to_string(),
            severity,
            timestamp: ts.to_string(),
            occurred_at: parse_timestamp(Some(ts)).unwrap(),
            source: "waze".to_string(),
        }
    }

    #[test]
    fn maps_lowercase_types() {
        assert_eq!(canonical_type("accidente", false), IncidentType::Accidente);
        assert_eq!(canonical_type("atasco", false), IncidentType::Atasco);
        assert_eq!(canonical_type("construccion", false), IncidentType::Construccion);
        assert_eq!(canonical_type("peligro", false), IncidentType::Peligro);
        assert_eq!(canonical_type("clima", false), IncidentType::Clima);
    }

    #[test]
    fn uppercase_and_unknown_fall_through_to_otro() {
        assert_eq!(canonical_type("ACCIDENTE", false), IncidentType::Otro);
        assert_eq!(canonical_type("alerta", false), IncidentType::Otro);
        assert_eq!(canonical_type("", false), IncidentType::Otro);
    }

    #[test]
    fn case_insensitive_mode() {
        assert_eq!(canonical_type("ACCIDENTE", true), IncidentType::Accidente);
        assert_eq!(canonical_type("Clima", true), IncidentType::Clima);
        assert_eq!(canonical_type("otro", true), IncidentType::Otro);
    }

    #[test]
    fn severity_bands() {
        let t = SeverityThresholds::default();
        assert_eq!(severity_category(10, &t), SeverityCategory::High);
        assert_eq!(severity_category(7, &t), SeverityCategory::High);
        assert_eq!(severity_category(6, &t), SeverityCategory::Medium);
        assert_eq!(severity_category(4, &t), SeverityCategory::Medium);
        assert_eq!(severity_category(3, &t), SeverityCategory::Low);
        assert_eq!(severity_category(-2, &t), SeverityCategory::Low);
        assert_eq!(severity_category(42, &t), SeverityCategory::High);
    }

    #[test]
    fn derives_temporal_fields() {
        let e = enrich_one(rec("atasco", "Providencia", 5, "2024-03-07T08:15:00"), &PipelineConfig::default());
        assert_eq!(e.hour, "08");
        assert_eq!(e.day, "2024-03-07");
        assert_eq!(e.month, "03");
        assert_eq!(e.year, "2024");
        assert_eq!(e.severity_category, SeverityCategory::Medium);
    }

    #[test]
    fn fills_description_and_normalises_comuna() {
        let cfg = PipelineConfig::default();
        let e = enrich_one(rec("peligro", " penalolen ", 1, "2024-03-07 08:15:00"), &cfg);
        assert_eq!(e.comuna, "Peñalolén");
        assert_eq!(e.description, "Incidente de tipo PELIGRO");

        let unknown = enrich_one(rec("peligro", "Vitacura", 1, "2024-03-07 08:15:00"), &cfg);
        assert_eq!(unknown.comuna, "Vitacura");
    }

    #[test]
    fn enrich_preserves_order() {
        let cfg = PipelineConfig::default();
        let out = enrich(
            vec![
                rec("atasco", "A", 1, "2024-01-01 01:00:00"),
                rec("clima", "B", 9, "2024-01-01 02:00:00"),
            ],
            &cfg,
        );
        assert_eq!(out[0].comuna, "A");
        assert_eq!(out[1].type_canonical, IncidentType::Clima);
    }
}
