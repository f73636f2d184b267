// Parsing and numeric helpers.
//
// Everything that touches untyped CSV text lives here so the stages can
// work on clean, typed values.
use chrono::{DateTime, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Trim an optional field and treat blank text as missing.
pub fn non_empty(s: Option<&str>) -> Option<&str> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Parse a coordinate-like value. Rejects anything that is not a finite
/// number (`NaN`, `inf`, text).
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let v = non_empty(s)?.parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    non_empty(s)?.parse::<i32>().ok()
}

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse an ISO-like timestamp. Offsets (`Z`, `+00:00`) are accepted and the
/// wall-clock time as written is kept, so the derived hour matches the text.
pub fn parse_timestamp(s: Option<&str>) -> Option<NaiveDateTime> {
    let s = non_empty(s)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

pub fn mean(sum: f64, count: usize) -> f64 {
    // 0 for an empty group rather than NaN.
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Percentage of `part` in `total`, 0 when `total` is 0.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

/// Round half away from zero to `decimals` places.
pub fn round_to(v: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (v * scale).round() / scale
}

/// Format a float with fixed decimals and `,` thousands separators, for
/// console output only (CSV views keep plain numbers).
pub fn format_number(n: f64, decimals: usize) -> String {
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_val: i64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = parts.next() {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
