// Batch orchestration.
//
// Validation, deduplication and enrichment run in sequence. The enriched
// set is then shared read-only by every view, which are computed as
// independent rayon tasks. The comuna -> risk -> safety chain runs inside a
// single task since each step needs the previous one finished.

use crate::config::PipelineConfig;
use crate::dedup::deduplicate;
use crate::enrich::enrich;
use crate::error::PipelineError;
use crate::hotspots::detect_hotspots;
use crate::loader::{load_and_validate, LoadReport};
use crate::output::{ResultSink, ViewName};
use crate::reports;
use crate::risk::{risk_ranking, safety_index, score_comunas};
use crate::types::{
    ComunaRow, ComunaTypeHourRow, ComunaTypeRow, DayRow, EnrichedIncident, HotspotRow, HourRow,
    IncidentRecord, RiskRow, SafetyRow, SeverityDistributionRow, SummaryStats, TypeRow,
};
use crate::util::{percentage, round_to};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

pub const BY_COMUNA: ViewName = ViewName::new("aggregates", "incidents_by_comuna");
pub const BY_TYPE: ViewName = ViewName::new("aggregates", "incidents_by_type");
pub const BY_HOUR: ViewName = ViewName::new("aggregates", "incidents_by_hour");
pub const BY_DAY: ViewName = ViewName::new("aggregates", "incidents_by_day");
pub const COMUNA_TYPE: ViewName = ViewName::new("aggregates", "comuna_type_analysis");
pub const COMUNA_TYPE_HOUR: ViewName = ViewName::new("aggregates", "comuna_type_hour_analysis");
pub const SEVERITY_DISTRIBUTION: ViewName = ViewName::new("aggregates", "severity_distribution");
pub const HOTSPOTS: ViewName = ViewName::new("hotspots", "traffic_hotspots");
pub const HOTSPOTS_COARSE: ViewName = ViewName::new("hotspots", "traffic_hotspots_coarse");
pub const RISK_RANKING: ViewName = ViewName::new("scores", "risk_ranking");
pub const SAFETY_INDEX: ViewName = ViewName::new("scores", "safety_index");
pub const SUMMARY: ViewName = ViewName::new("summary", "summary_statistics");

/// Every view of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResults {
    pub by_comuna: Vec<ComunaRow>,
    pub by_type: Vec<TypeRow>,
    pub by_hour: Vec<HourRow>,
    pub by_day: Vec<DayRow>,
    pub comuna_type: Vec<ComunaTypeRow>,
    pub comuna_type_hour: Vec<ComunaTypeHourRow>,
    pub severity_distribution: Vec<SeverityDistributionRow>,
    pub hotspots: Vec<HotspotRow>,
    pub hotspots_coarse: Vec<HotspotRow>,
    pub risk_ranking: Vec<RiskRow>,
    pub safety_index: Vec<SafetyRow>,
    pub summary: Option<SummaryStats>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ViewCount {
    pub view: String,
    pub rows: usize,
}

/// Data-quality and timing figures reported next to the views.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunReport {
    pub files: usize,
    pub total_rows: usize,
    pub retained: usize,
    pub dropped: usize,
    pub duplicates: usize,
    pub enriched: usize,
    pub out_of_range_severity: usize,
    pub rejections: BTreeMap<String, usize>,
    /// Share of input rows that survived validation and dedup, in percent.
    pub filter_rate: f64,
    pub processing_ms: u64,
    pub records_per_second: f64,
    pub views: Vec<ViewCount>,
}

impl RunReport {
    fn from_load(load: &LoadReport) -> Self {
        RunReport {
            files: load.files,
            total_rows: load.total_rows,
            retained: load.retained,
            dropped: load.dropped,
            out_of_range_severity: load.out_of_range_severity,
            rejections: load.rejections.clone(),
            ..RunReport::default()
        }
    }
}

/// Stages 2 and 3: deduplicate then enrich.
pub fn prepare(
    records: Vec<IncidentRecord>,
    load: &LoadReport,
    cfg: &PipelineConfig,
) -> (Vec<EnrichedIncident>, RunReport) {
    let mut report = RunReport::from_load(load);
    let (unique, duplicates) = deduplicate(records);
    report.duplicates = duplicates;
    let data = enrich(unique, cfg);
    report.enriched = data.len();
    report.filter_rate = round_to(percentage(data.len(), report.total_rows), 2);
    (data, report)
}

/// Compute every view over the enriched set.
pub fn analyze(data: &[EnrichedIncident], cfg: &PipelineConfig) -> AnalysisResults {
    let mut out = AnalysisResults::default();
    {
        let AnalysisResults {
            by_comuna,
            by_type,
            by_hour,
            by_day,
            comuna_type,
            comuna_type_hour,
            severity_distribution,
            hotspots,
            hotspots_coarse,
            risk_ranking: ranking,
            safety_index: safety,
            summary,
        } = &mut out;

        rayon::scope(|s| {
            s.spawn(|_| {
                let groups = reports::comuna_groups(data);
                *by_comuna = reports::comuna_rows(&groups);
                let scored = score_comunas(&groups);
                *ranking = risk_ranking(&scored);
                *safety = safety_index(&scored);
            });
            s.spawn(|_| *by_type = reports::incidents_by_type(data));
            s.spawn(|_| *by_hour = reports::incidents_by_hour(data));
            s.spawn(|_| *by_day = reports::incidents_by_day(data));
            s.spawn(|_| *comuna_type = reports::comuna_type_analysis(data));
            s.spawn(|_| {
                *comuna_type_hour = reports::comuna_type_hour_analysis(data, cfg.min_composite_group)
            });
            s.spawn(|_| *severity_distribution = reports::severity_distribution(data));
            s.spawn(|_| *hotspots = detect_hotspots(data, cfg.hotspots.fine));
            s.spawn(|_| *hotspots_coarse = detect_hotspots(data, cfg.hotspots.coarse));
            s.spawn(|_| *summary = Some(reports::generate_summary(data)));
        });
    }
    out
}

/// Hand every view to the sink, then the summary and run report documents.
pub fn emit<S: ResultSink>(
    results: &AnalysisResults,
    report: &mut RunReport,
    sink: &mut S,
) -> Result<(), PipelineError> {
    let mut counts = Vec::new();
    let mut put = |view: ViewName, rows: usize| counts.push(ViewCount { view: view.to_string(), rows });

    sink.write_view(BY_COMUNA, &results.by_comuna)?;
    put(BY_COMUNA, results.by_comuna.len());
    sink.write_view(BY_TYPE, &results.by_type)?;
    put(BY_TYPE, results.by_type.len());
    sink.write_view(BY_HOUR, &results.by_hour)?;
    put(BY_HOUR, results.by_hour.len());
    sink.write_view(BY_DAY, &results.by_day)?;
    put(BY_DAY, results.by_day.len());
    sink.write_view(COMUNA_TYPE, &results.comuna_type)?;
    put(COMUNA_TYPE, results.comuna_type.len());
    sink.write_view(COMUNA_TYPE_HOUR, &results.comuna_type_hour)?;
    put(COMUNA_TYPE_HOUR, results.comuna_type_hour.len());
    sink.write_view(SEVERITY_DISTRIBUTION, &results.severity_distribution)?;
    put(SEVERITY_DISTRIBUTION, results.severity_distribution.len());
    sink.write_view(HOTSPOTS, &results.hotspots)?;
    put(HOTSPOTS, results.hotspots.len());
    sink.write_view(HOTSPOTS_COARSE, &results.hotspots_coarse)?;
    put(HOTSPOTS_COARSE, results.hotspots_coarse.len());
    sink.write_view(RISK_RANKING, &results.risk_ranking)?;
    put(RISK_RANKING, results.risk_ranking.len());
    sink.write_view(SAFETY_INDEX, &results.safety_index)?;
    put(SAFETY_INDEX, results.safety_index.len());
    let summary: Vec<&SummaryStats> = results.summary.iter().collect();
    sink.write_view(SUMMARY, &summary)?;
    put(SUMMARY, summary.len());

    report.views = counts;
    if let Some(s) = &results.summary {
        sink.write_document("summary", s)?;
    }
    sink.write_document("run_report", &*report)?;
    Ok(())
}

/// Everything after the validator, for records already in memory.
pub fn run_records<S: ResultSink>(
    records: Vec<IncidentRecord>,
    load: &LoadReport,
    cfg: &PipelineConfig,
    sink: &mut S,
) -> Result<(AnalysisResults, RunReport), PipelineError> {
    let started = Instant::now();
    let (data, mut report) = prepare(records, load, cfg);
    let results = analyze_and_emit(&data, &mut report, cfg, sink, started)?;
    Ok((results, report))
}

/// Analyze an enriched set, stamp the timing on `report` (measured from
/// `started`) and emit everything to the sink.
pub fn analyze_and_emit<S: ResultSink>(
    data: &[EnrichedIncident],
    report: &mut RunReport,
    cfg: &PipelineConfig,
    sink: &mut S,
    started: Instant,
) -> Result<AnalysisResults, PipelineError> {
    let results = analyze(data, cfg);
    finish_timing(report, started);
    emit(&results, report, sink)?;
    log_report(report);
    Ok(results)
}

/// Full batch run: read and validate the inputs, then [`run_records`].
pub fn run<S: ResultSink>(
    inputs: &[PathBuf],
    cfg: &PipelineConfig,
    sink: &mut S,
) -> Result<(AnalysisResults, RunReport), PipelineError> {
    log::info!("Starting batch run over {} input(s)", inputs.len());
    let (records, load) = load_and_validate(inputs, cfg)?;
    run_records(records, &load, cfg, sink)
}

fn finish_timing(report: &mut RunReport, started: Instant) {
    let elapsed = started.elapsed();
    report.processing_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    let secs = elapsed.as_secs_f64();
    report.records_per_second = if secs > 0.0 {
        round_to(report.enriched as f64 / secs, 2)
    } else {
        0.0
    };
}

pub fn log_report(report: &RunReport) {
    log::info!(
        "Run complete: {} rows, {} retained, {} dropped, {} duplicates, {} enriched in {} ms",
        report.total_rows,
        report.retained,
        report.dropped,
        report.duplicates,
        report.enriched,
        report.processing_ms
    );
    for v in &report.views {
        log::debug!("  {}: {} rows", v.view, v.rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{read_rows, validate};
    use crate::output::MemorySink;
    use std::path::Path;

    fn load(text: &str) -> (Vec<IncidentRecord>, LoadReport) {
        let batch = read_rows(text.as_bytes(), Path::new("mem.csv")).unwrap();
        validate(batch.rows, &PipelineConfig::default())
    }

    #[test]
    fn duplicate_scenario() {
        let (records, load) = load(
            "a,accidente,,-33.45,-70.66,,,Y,3,2024-01-01 10:00:00,waze\n\
             b,accidente,,-33.45,-70.66,,,Y,3,2024-01-01 10:00:00,waze\n\
             c,clima,,-33.40,-70.60,,,X,8,2024-01-01 11:00:00,waze\n",
        );
        let mut sink = MemorySink::new(true);
        let (results, report) = run_records(records, &load, &PipelineConfig::default(), &mut sink).unwrap();
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.enriched, 2);
        let high: Vec<_> = results
            .severity_distribution
            .iter()
            .filter(|r| r.severity_category == crate::types::SeverityCategory::High)
            .collect();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].total_incidents, 1);
        assert_eq!(results.summary.as_ref().unwrap().total_critical_incidents, 1);
    }

    #[test]
    fn empty_set_produces_empty_views() {
        let mut sink = MemorySink::new(true);
        let (results, report) =
            run_records(Vec::new(), &LoadReport::default(), &PipelineConfig::default(), &mut sink).unwrap();
        assert!(results.severity_distribution.is_empty());
        assert!(results.safety_index.is_empty());
        assert_eq!(results.summary.as_ref().unwrap().total_incidents, 0);
        assert_eq!(report.filter_rate, 0.0);
        assert_eq!(report.views.len(), 12);
        assert!(sink.documents.contains_key("run_report"));
    }

    #[test]
    fn analyze_is_deterministic() {
        let (records, load) = load(
            "a,accidente,,-33.45,-70.66,,,Y,3,2024-01-01 10:00:00,\n\
             b,atasco,,-33.45,-70.66,,,X,3,2024-01-01 10:00:00,\n\
             c,clima,,-33.40,-70.60,,,Z,8,2024-01-01 11:00:00,\n\
             d,peligro,,-33.40,-70.60,,,W,5,2024-01-02 11:00:00,\n",
        );
        let cfg = PipelineConfig::default();
        let (data, _) = prepare(records, &load, &cfg);
        let first = analyze(&data, &cfg);
        for _ in 0..5 {
            assert_eq!(analyze(&data, &cfg), first);
        }
        // Ties on count fall back to key order.
        let comunas: Vec<_> = first.by_comuna.iter().map(|r| r.comuna.as_str()).collect();
        assert_eq!(comunas, vec!["W", "X", "Y", "Z"]);
    }

    #[test]
    fn risk_uses_exact_comuna_mean() {
        let (records, load) = load(
            "a,accidente,,-33.45,-70.66,,,X,1,2024-01-01 10:00:00,\n\
             b,atasco,,-33.45,-70.66,,,X,1,2024-01-01 10:05:00,\n\
             c,clima,,-33.40,-70.60,,,X,2,2024-01-01 11:00:00,\n",
        );
        let cfg = PipelineConfig::default();
        let (data, _) = prepare(records, &load, &cfg);
        let results = analyze(&data, &cfg);
        assert_eq!(results.by_comuna[0].avg_severity, 1.33);
        assert_eq!(results.risk_ranking[0].risk_score, 14.23);
        assert_eq!(results.safety_index[0].risk_score, 14.23);
    }

    #[test]
    fn analyze_and_emit_fills_timing() {
        let (records, load) = load(
            "a,accidente,,-33.45,-70.66,,,Y,3,2024-01-01 10:00:00,\n\
             b,clima,,-33.40,-70.60,,,X,8,2024-01-01 11:00:00,\n",
        );
        let cfg = PipelineConfig::default();
        let started = Instant::now();
        let (data, mut report) = prepare(records, &load, &cfg);
        let mut sink = MemorySink::new(true);
        analyze_and_emit(&data, &mut report, &cfg, &mut sink, started).unwrap();
        assert!(report.records_per_second > 0.0);
        assert_eq!(report.views.len(), 12);
        assert_eq!(
            sink.documents["run_report"]["records_per_second"],
            report.records_per_second
        );
    }

    #[test]
    fn risk_feeds_safety() {
        let (records, load) = load(
            "a,accidente,,-33.45,-70.66,,,Y,9,2024-01-01 10:00:00,\n\
             b,atasco,,-33.45,-70.66,,,Y,8,2024-01-01 10:05:00,\n\
             c,clima,,-33.40,-70.60,,,X,0,2024-01-01 11:00:00,\n",
        );
        let cfg = PipelineConfig::default();
        let (data, _) = prepare(records, &load, &cfg);
        let results = analyze(&data, &cfg);
        assert_eq!(results.risk_ranking[0].comuna, "Y");
        let y = results.safety_index.iter().find(|r| r.comuna == "Y").unwrap();
        assert_eq!(y.safety_index, 0.0);
        assert_eq!(results.safety_index.len(), results.by_comuna.len());
    }
}
