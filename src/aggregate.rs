// Generic reduce-by-key engine.
//
// Every named view is one call to [`reduce_by_key`] with a different key
// function. Groups come back ordered by key; views then re-sort by count or
// score with a stable sort, so ties keep key order and output is the same on
// every run.

use crate::types::{EnrichedIncident, SeverityCategory};
use crate::util::mean;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Folds records of one group into a running value.
pub trait Accumulator<R>: Default + Send {
    fn add(&mut self, item: &R);
    /// Combine two partial results of the same group.
    fn merge(&mut self, other: Self);
}

/// Group `items` by `key_fn` and fold each group with `A`.
///
/// Partial maps are built in parallel and merged, so `A::merge` must be
/// associative.
pub fn reduce_by_key<R, K, A, F>(items: &[R], key_fn: F) -> BTreeMap<K, A>
where
    R: Sync,
    K: Ord + Send,
    A: Accumulator<R>,
    F: Fn(&R) -> K + Sync,
{
    items
        .par_iter()
        .fold(BTreeMap::new, |mut acc: BTreeMap<K, A>, item| {
            acc.entry(key_fn(item)).or_default().add(item);
            acc
        })
        .reduce(BTreeMap::new, |mut left, right| {
            for (k, v) in right {
                match left.entry(k) {
                    std::collections::btree_map::Entry::Vacant(e) => {
                        e.insert(v);
                    }
                    std::collections::btree_map::Entry::Occupied(mut e) => e.get_mut().merge(v),
                }
            }
            left
        })
}

/// Count / sum / max / critical accumulator over severities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeverityStats {
    pub count: usize,
    pub sum: i64,
    pub max: Option<i32>,
    pub critical: usize,
}

impl Accumulator<EnrichedIncident> for SeverityStats {
    fn add(&mut self, item: &EnrichedIncident) {
        let s = item.severity();
        self.count += 1;
        self.sum += i64::from(s);
        self.max = Some(self.max.map_or(s, |m| m.max(s)));
        if item.severity_category == SeverityCategory::High {
            self.critical += 1;
        }
    }

    fn merge(&mut self, other: Self) {
        self.count += other.count;
        self.sum += other.sum;
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.critical += other.critical;
    }
}

/// [`SeverityStats`] plus the distinct comunas seen in the group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellStats {
    pub stats: SeverityStats,
    pub comunas: BTreeSet<String>,
}

impl Accumulator<EnrichedIncident> for CellStats {
    fn add(&mut self, item: &EnrichedIncident) {
        self.stats.add(item);
        if !self.comunas.contains(&item.comuna) {
            self.comunas.insert(item.comuna.clone());
        }
    }

    fn merge(&mut self, other: Self) {
        self.stats.merge(other.stats);
        self.comunas.extend(other.comunas);
    }
}

/// The reduced form of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAggregate<K> {
    pub key: K,
    pub count: usize,
    pub avg_severity: f64,
    pub max_severity: i32,
    pub critical_count: usize,
    pub distinct_comunas: Option<BTreeSet<String>>,
}

impl<K> GroupAggregate<K> {
    fn from_stats(key: K, s: SeverityStats, comunas: Option<BTreeSet<String>>) -> Self {
        GroupAggregate {
            key,
            count: s.count,
            avg_severity: mean(s.sum as f64, s.count),
            max_severity: s.max.unwrap_or(0),
            critical_count: s.critical,
            distinct_comunas: comunas,
        }
    }
}

/// One aggregate per distinct key, in key order.
pub fn aggregate<K, F>(records: &[EnrichedIncident], key_fn: F) -> Vec<GroupAggregate<K>>
where
    K: Ord + Send,
    F: Fn(&EnrichedIncident) -> K + Sync,
{
    reduce_by_key::<_, _, SeverityStats, _>(records, key_fn)
        .into_iter()
        .map(|(k, s)| GroupAggregate::from_stats(k, s, None))
        .collect()
}

/// Like [`aggregate`], also tracking the distinct comunas per group.
pub fn aggregate_with_comunas<K, F>(records: &[EnrichedIncident], key_fn: F) -> Vec<GroupAggregate<K>>
where
    K: Ord + Send,
    F: Fn(&EnrichedIncident) -> K + Sync,
{
    reduce_by_key::<_, _, CellStats, _>(records, key_fn)
        .into_iter()
        .map(|(k, c)| GroupAggregate::from_stats(k, c.stats, Some(c.comunas)))
        .collect()
}

/// Stable sort by count, largest first.
pub fn sort_by_count_desc<K>(groups: &mut [GroupAggregate<K>]) {
    groups.sort_by(|a, b| b.count.cmp(&a.count));
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::enrich::enrich_one;
    use crate::types::IncidentRecord;
    use crate::util::parse_timestamp;

    pub(crate) fn incident(
        comuna: &str,
        type_raw: &str,
        severity: i32,
        lat: f64,
        lon: f64,
        ts: &str,
    ) -> EnrichedIncident {
        let record = IncidentRecord {
            id: format!("{comuna}-{severity}-{ts}"),
            type_raw: type_raw.to_string(),
            description: None,
            latitude: lat,
            longitude: lon,
            street: None,
            city: None,
            comuna: comuna.to_string(),
            severity,
            timestamp: ts.to_string(),
            occurred_at: parse_timestamp(Some(ts)).unwrap(),
            source: "waze".to_string(),
        };
        enrich_one(record, &PipelineConfig::default())
    }

    fn sample() -> Vec<EnrichedIncident> {
        vec![
            incident("A", "accidente", 8, -33.45, -70.66, "2024-01-01 10:00:00"),
            incident("A", "atasco", 2, -33.45, -70.66, "2024-01-01 11:00:00"),
            incident("B", "atasco", 5, -33.40, -70.60, "2024-01-02 10:00:00"),
            incident("A", "clima", 9, -33.45, -70.66, "2024-01-02 12:00:00"),
        ]
    }

    #[test]
    fn groups_and_reduces() {
        let groups = aggregate(&sample(), |r| r.comuna.clone());
        assert_eq!(groups.len(), 2);
        let a = &groups[0];
        assert_eq!(a.key, "A");
        assert_eq!(a.count, 3);
        assert!((a.avg_severity - 19.0 / 3.0).abs() < 1e-12);
        assert_eq!(a.max_severity, 9);
        assert_eq!(a.critical_count, 2);
        assert_eq!(a.distinct_comunas, None);
    }

    #[test]
    fn tuple_keys() {
        let groups = aggregate(&sample(), |r| (r.comuna.clone(), r.type_canonical));
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.count == 1));
    }

    #[test]
    fn counts_partition_the_input() {
        let data = sample();
        for total in [
            aggregate(&data, |r| r.hour.clone()).iter().map(|g| g.count).sum::<usize>(),
            aggregate(&data, |r| r.day.clone()).iter().map(|g| g.count).sum::<usize>(),
            aggregate(&data, |r| r.severity_category).iter().map(|g| g.count).sum::<usize>(),
        ] {
            assert_eq!(total, data.len());
        }
    }

    #[test]
    fn distinct_comunas_are_deduplicated() {
        let groups = aggregate_with_comunas(&sample(), |r| r.type_canonical);
        let atasco = groups.iter().find(|g| g.key == crate::types::IncidentType::Atasco).unwrap();
        let set = atasco.distinct_comunas.as_ref().unwrap();
        assert_eq!(set.iter().cloned().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn merge_matches_sequential_fold() {
        let data = sample();
        let mut whole = SeverityStats::default();
        data.iter().for_each(|r| whole.add(r));
        let mut left = SeverityStats::default();
        let mut right = SeverityStats::default();
        data[..1].iter().for_each(|r| left.add(r));
        data[1..].iter().for_each(|r| right.add(r));
        left.merge(right);
        assert_eq!(left, whole);
    }

    #[test]
    fn stable_count_sort_keeps_key_order_on_ties() {
        let mut groups = aggregate(&sample(), |r| r.type_canonical);
        sort_by_count_desc(&mut groups);
        let keys: Vec<_> = groups.iter().map(|g| g.key).collect();
        use crate::types::IncidentType::*;
        assert_eq!(keys, vec![Atasco, Accidente, Clima]);
    }

    #[test]
    fn empty_input_has_no_groups() {
        assert!(aggregate(&[], |r: &EnrichedIncident| r.comuna.clone()).is_empty());
    }
}
