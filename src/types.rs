use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tabled::Tabled;

/// One line of the 11-column incident export, read positionally.
///
/// Column order: id, type, description, latitude, longitude, street, city,
/// comuna, severity, timestamp, source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub id: Option<String>,
    pub type_raw: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub comuna: Option<String>,
    pub severity: Option<String>,
    pub timestamp: Option<String>,
    pub source: Option<String>,
}

impl RawRow {
    pub const COLUMNS: usize = 11;

    pub fn from_record(rec: &csv::StringRecord) -> Self {
        let field = |i: usize| rec.get(i).map(str::to_string);
        RawRow {
            id: field(0),
            type_raw: field(1),
            description: field(2),
            latitude: field(3),
            longitude: field(4),
            street: field(5),
            city: field(6),
            comuna: field(7),
            severity: field(8),
            timestamp: field(9),
            source: field(10),
        }
    }

    /// True for the optional header line of an export.
    pub fn is_header(&self) -> bool {
        let id = self.id.as_deref().map(str::trim).unwrap_or("");
        let lat = self.latitude.as_deref().map(str::trim).unwrap_or("");
        (id.eq_ignore_ascii_case("id") || id.eq_ignore_ascii_case("incident_id"))
            && lat.eq_ignore_ascii_case("latitude")
    }
}

/// Canonical incident type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    Accidente,
    Atasco,
    Construccion,
    Peligro,
    Clima,
    Otro,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityCategory {
    High,
    Medium,
    Low,
}

/// A record that passed validation. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentRecord {
    pub id: String,
    pub type_raw: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub street: Option<String>,
    pub city: Option<String>,
    pub comuna: String,
    pub severity: i32,
    pub timestamp: String,
    pub occurred_at: NaiveDateTime,
    pub source: String,
}

/// A validated record plus the fields derived from it by the enricher.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedIncident {
    pub record: IncidentRecord,
    /// Comuna after alias normalisation; the grouping key for district views.
    pub comuna: String,
    pub description: String,
    pub type_canonical: IncidentType,
    pub severity_category: SeverityCategory,
    pub hour: String,
    pub day: String,
    pub month: String,
    pub year: String,
}

impl EnrichedIncident {
    pub fn severity(&self) -> i32 {
        self.record.severity
    }
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct ComunaRow {
    pub comuna: String,
    pub total_incidents: usize,
    pub avg_severity: f64,
    pub max_severity: i32,
    pub critical_incidents: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct TypeRow {
    pub incident_type: IncidentType,
    pub total_incidents: usize,
    pub avg_severity: f64,
    pub max_severity: i32,
    pub critical_incidents: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct HourRow {
    pub hour: String,
    pub total_incidents: usize,
    pub avg_severity: f64,
    pub max_severity: i32,
    pub critical_incidents: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct DayRow {
    pub day: String,
    pub total_incidents: usize,
    pub avg_severity: f64,
    pub max_severity: i32,
    pub critical_incidents: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct ComunaTypeRow {
    pub comuna: String,
    pub incident_type: IncidentType,
    pub total_incidents: usize,
    pub avg_severity: f64,
    pub max_severity: i32,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct ComunaTypeHourRow {
    pub comuna: String,
    pub incident_type: IncidentType,
    pub hour: String,
    pub total_incidents: usize,
    pub avg_severity: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct SeverityDistributionRow {
    pub severity_category: SeverityCategory,
    pub total_incidents: usize,
    pub avg_severity: f64,
    pub percentage: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct HotspotRow {
    pub lat_cell: f64,
    pub lon_cell: f64,
    pub density: usize,
    pub avg_severity: f64,
    pub max_severity: i32,
    pub critical_incidents: usize,
    pub distinct_comunas: usize,
    pub comunas: String,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct RiskRow {
    pub comuna: String,
    pub total_incidents: usize,
    pub avg_severity: f64,
    pub critical_incidents: usize,
    pub risk_score: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct SafetyRow {
    pub comuna: String,
    pub risk_score: f64,
    pub safety_index: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct SummaryStats {
    pub total_incidents: usize,
    pub avg_severity: f64,
    pub total_critical_incidents: usize,
    pub distinct_comunas: usize,
    pub distinct_incident_types: usize,
}
