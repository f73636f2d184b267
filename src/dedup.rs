// Deduplicator.
//
// Two records are duplicates when every field other than `id` matches. The
// first occurrence wins; later copies are counted and dropped.
use crate::types::IncidentRecord;
use std::collections::HashSet;

/// Content of a record with the id left out. Coordinates compare by bit
/// pattern so the key can be hashed.
#[derive(Debug, PartialEq, Eq, Hash)]
struct ContentKey<'a> {
    type_raw: &'a str,
    description: Option<&'a str>,
    latitude: u64,
    longitude: u64,
    street: Option<&'a str>,
    city: Option<&'a str>,
    comuna: &'a str,
    severity: i32,
    timestamp: &'a str,
    source: &'a str,
}

impl<'a> ContentKey<'a> {
    fn of(r: &'a IncidentRecord) -> Self {
        ContentKey {
            type_raw: &r.type_raw,
            description: r.description.as_deref(),
            latitude: r.latitude.to_bits(),
            longitude: r.longitude.to_bits(),
            street: r.street.as_deref(),
            city: r.city.as_deref(),
            comuna: &r.comuna,
            severity: r.severity,
            timestamp: &r.timestamp,
            source: &r.source,
        }
    }
}

/// Returns the surviving records and how many duplicates were removed.
pub fn deduplicate(records: Vec<IncidentRecord>) -> (Vec<IncidentRecord>, usize) {
    let keep: Vec<bool> = {
        let mut seen: HashSet<ContentKey<'_>> = HashSet::with_capacity(records.len());
        records.iter().map(|r| seen.insert(ContentKey::of(r))).collect()
    };
    let before = records.len();
    let unique: Vec<IncidentRecord> = records
        .into_iter()
        .zip(keep)
        .filter_map(|(r, k)| k.then_some(r))
        .collect();
    let duplicates = before - unique.len();
    log::info!("Deduplication removed {} of {} records", duplicates, before);
    (unique, duplicates)
}
