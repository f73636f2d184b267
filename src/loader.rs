// Record source and validator.
//
// Reads one or more 11-column exports as a single logical record set, then
// keeps only rows carrying every required field. Individual bad rows are
// counted, never fatal; only an unreadable source aborts the run.
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::{IncidentRecord, RawRow};
use crate::util::{non_empty, parse_f64_safe, parse_i32_safe, parse_timestamp};
use csv::ReaderBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LoadReport {
    pub files: usize,
    pub total_rows: usize,
    pub retained: usize,
    pub dropped: usize,
    /// Retained rows whose severity is outside 0..=10.
    pub out_of_range_severity: usize,
    pub rejections: BTreeMap<String, usize>,
}

/// Why a row failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    MissingField(&'static str),
    BadCoordinate,
    BadTimestamp,
    BadSeverity,
    OutOfBounds,
}

impl Rejection {
    pub fn label(&self) -> String {
        match self {
            Rejection::Malformed => "malformed_row".to_string(),
            Rejection::MissingField(f) => format!("missing_{}", f),
            Rejection::BadCoordinate => "bad_coordinate".to_string(),
            Rejection::BadTimestamp => "bad_timestamp".to_string(),
            Rejection::BadSeverity => "bad_severity".to_string(),
            Rejection::OutOfBounds => "out_of_bounds".to_string(),
        }
    }
}

/// Expand the input selection: files are taken as-is, directories are
/// walked for `*.csv` files. The result is sorted so runs are repeatable.
pub fn resolve_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input) {
                let entry = entry?;
                let is_csv = entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
                if entry.file_type().is_file() && is_csv {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    if files.is_empty() {
        return Err(PipelineError::NoInput(inputs.to_vec()));
    }
    Ok(files)
}

/// Rows read from a source. Lines the CSV reader could not split are kept
/// as `Err(Rejection::Malformed)` so the validator counts them.
#[derive(Debug, Default)]
pub struct RawBatch {
    pub rows: Vec<Result<RawRow, Rejection>>,
}

/// Read every row of one export. A leading header line is skipped; quoted
/// fields may span lines.
pub fn read_rows<R: Read>(rdr: R, origin: &Path) -> Result<RawBatch, PipelineError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(rdr);
    let mut batch = RawBatch::default();
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(rec) => {
                let row = RawRow::from_record(&rec);
                if idx == 0 && row.is_header() {
                    continue;
                }
                if rec.len() != RawRow::COLUMNS {
                    log::debug!(
                        "{}: line {} has {} columns",
                        origin.display(),
                        idx + 1,
                        rec.len()
                    );
                }
                batch.rows.push(Ok(row));
            }
            Err(e) if e.is_io_error() => {
                return Err(PipelineError::SourceUnreadable {
                    path: origin.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                log::debug!("{}: skipping malformed row: {}", origin.display(), e);
                batch.rows.push(Err(Rejection::Malformed));
            }
        }
    }
    Ok(batch)
}

pub fn read_file(path: &Path) -> Result<RawBatch, PipelineError> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::SourceUnreadable {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    read_rows(file, path)
}

/// Check one raw row against the required-field contract.
pub fn validate_row(row: &RawRow, cfg: &PipelineConfig) -> Result<IncidentRecord, Rejection> {
    let required = |v: &Option<String>, name: &'static str| {
        non_empty(v.as_deref())
            .map(str::to_string)
            .ok_or(Rejection::MissingField(name))
    };
    let id = required(&row.id, "id")?;
    let type_raw = required(&row.type_raw, "type")?;
    let lat_text = required(&row.latitude, "latitude")?;
    let lon_text = required(&row.longitude, "longitude")?;
    let comuna = required(&row.comuna, "comuna")?;
    let timestamp = required(&row.timestamp, "timestamp")?;

    let latitude = parse_f64_safe(Some(&lat_text)).ok_or(Rejection::BadCoordinate)?;
    let longitude = parse_f64_safe(Some(&lon_text)).ok_or(Rejection::BadCoordinate)?;
    if let Some(bounds) = &cfg.bounds {
        if !bounds.contains(latitude, longitude) {
            return Err(Rejection::OutOfBounds);
        }
    }
    let occurred_at = parse_timestamp(Some(&timestamp)).ok_or(Rejection::BadTimestamp)?;

    // A blank severity reads as 0; text that is not an integer is a violation.
    let severity = match non_empty(row.severity.as_deref()) {
        None => 0,
        Some(s) => parse_i32_safe(Some(s)).ok_or(Rejection::BadSeverity)?,
    };

    let optional = |v: &Option<String>| non_empty(v.as_deref()).map(str::to_string);
    Ok(IncidentRecord {
        id,
        type_raw,
        description: optional(&row.description),
        latitude,
        longitude,
        street: optional(&row.street),
        city: optional(&row.city),
        comuna,
        severity,
        timestamp,
        occurred_at,
        source: optional(&row.source).unwrap_or_else(|| "waze".to_string()),
    })
}

/// Validator stage: keep valid rows, count the rest by reason.
pub fn validate(
    rows: Vec<Result<RawRow, Rejection>>,
    cfg: &PipelineConfig,
) -> (Vec<IncidentRecord>, LoadReport) {
    let mut report = LoadReport {
        total_rows: rows.len(),
        ..LoadReport::default()
    };
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        match row.and_then(|r| validate_row(&r, cfg)) {
            Ok(rec) => {
                if !(0..=10).contains(&rec.severity) {
                    report.out_of_range_severity += 1;
                }
                kept.push(rec);
            }
            Err(reason) => {
                report.dropped += 1;
                *report.rejections.entry(reason.label()).or_insert(0) += 1;
            }
        }
    }
    report.retained = kept.len();
    if report.out_of_range_severity > 0 {
        log::warn!(
            "{} retained records have severity outside 0-10; kept as-is",
            report.out_of_range_severity
        );
    }
    (kept, report)
}

/// Read all inputs and run the validator over the combined rows.
pub fn load_and_validate(
    inputs: &[PathBuf],
    cfg: &PipelineConfig,
) -> Result<(Vec<IncidentRecord>, LoadReport), PipelineError> {
    let files = resolve_inputs(inputs)?;
    let mut rows = Vec::new();
    for path in &files {
        let batch = read_file(path)?;
        log::info!("Read {} rows from {}", batch.rows.len(), path.display());
        rows.extend(batch.rows);
    }
    let (records, mut report) = validate(rows, cfg);
    report.files = files.len();
    log::info!(
        "Validation kept {} of {} rows ({} dropped)",
        report.retained,
        report.total_rows,
        report.dropped
    );
    Ok((records, report))
}
