// Hotspot detection over rounded-coordinate cells.
//
// Two passes run over the same data: a coarse one (2 decimals, density of
// at least 5) and the default fine one (3 decimals, at least 3).

use crate::aggregate::{aggregate_with_comunas, sort_by_count_desc};
use crate::config::HotspotPass;
use crate::types::{EnrichedIncident, HotspotRow};
use crate::util::round_to;

/// A rounded coordinate pair, stored as integers scaled by `10^precision`
/// so that equality is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeoCell {
    pub lat: i64,
    pub lon: i64,
}

impl GeoCell {
    pub fn of(latitude: f64, longitude: f64, precision: u32) -> Self {
        let scale = 10f64.powi(precision as i32);
        GeoCell {
            lat: (latitude * scale).round() as i64,
            lon: (longitude * scale).round() as i64,
        }
    }

    /// Cell centre as (lat, lon) degrees.
    pub fn degrees(&self, precision: u32) -> (f64, f64) {
        let scale = 10f64.powi(precision as i32);
        (
            round_to(self.lat as f64 / scale, precision),
            round_to(self.lon as f64 / scale, precision),
        )
    }
}

pub fn detect_hotspots(data: &[EnrichedIncident], pass: HotspotPass) -> Vec<HotspotRow> {
    let mut groups = aggregate_with_comunas(data, |r| {
        GeoCell::of(r.record.latitude, r.record.longitude, pass.precision)
    });
    groups.retain(|g| g.count >= pass.min_density);
    sort_by_count_desc(&mut groups);
    log::debug!(
        "Hotspot pass (precision {}, min density {}): {} cells",
        pass.precision,
        pass.min_density,
        groups.len()
    );
    groups
        .into_iter()
        .map(|g| {
            let (lat_cell, lon_cell) = g.key.degrees(pass.precision);
            let comunas: Vec<String> = g.distinct_comunas.unwrap_or_default().into_iter().collect();
            HotspotRow {
                lat_cell,
                lon_cell,
                density: g.count,
                avg_severity: round_to(g.avg_severity, 2),
                max_severity: g.max_severity,
                critical_incidents: g.critical_count,
                distinct_comunas: comunas.len(),
                comunas: comunas.join("|"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::incident;

    fn cluster() -> Vec<EnrichedIncident> {
        let ts = "2024-01-01 10:00:00";
        vec![
            incident("Santiago", "atasco", 3, -33.4501, -70.6601, ts),
            incident("Santiago", "atasco", 8, -33.4502, -70.6604, ts),
            incident("Providencia", "peligro", 5, -33.4498, -70.6597, ts),
            incident("Santiago", "clima", 1, -33.4540, -70.6640, ts),
            incident("Santiago", "clima", 1, -33.4541, -70.6641, ts),
            incident("Maipu", "accidente", 9, -33.5100, -70.7600, ts),
        ]
    }

    #[test]
    fn rounding_defines_cells() {
        assert_eq!(GeoCell::of(-33.4501, -70.6601, 3), GeoCell::of(-33.4498, -70.6597, 3));
        assert_ne!(GeoCell::of(-33.4501, -70.6601, 3), GeoCell::of(-33.4540, -70.6640, 3));
        assert_eq!(GeoCell::of(-33.4501, -70.6601, 2), GeoCell::of(-33.4540, -70.6640, 2));
        assert_eq!(GeoCell::of(-33.4501, -70.6601, 3).degrees(3), (-33.45, -70.66));
    }

    #[test]
    fn fine_pass() {
        let rows = detect_hotspots(&cluster(), HotspotPass { precision: 3, min_density: 3 });
        assert_eq!(rows.len(), 1);
        let hot = &rows[0];
        assert_eq!(hot.density, 3);
        assert_eq!((hot.lat_cell, hot.lon_cell), (-33.45, -70.66));
        assert_eq!(hot.max_severity, 8);
        assert_eq!(hot.critical_incidents, 1);
        assert_eq!(hot.distinct_comunas, 2);
        assert_eq!(hot.comunas, "Providencia|Santiago");
    }

    #[test]
    fn coarse_pass_merges_neighbouring_cells() {
        let rows = detect_hotspots(&cluster(), HotspotPass { precision: 2, min_density: 5 });
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].density, 5);
    }

    #[test]
    fn never_below_threshold_and_monotone() {
        let data = cluster();
        let mut last = usize::MAX;
        for min_density in 1..=7 {
            let rows = detect_hotspots(&data, HotspotPass { precision: 3, min_density });
            assert!(rows.iter().all(|r| r.density >= min_density));
            assert!(rows.len() <= last);
            last = rows.len();
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn sorted_by_density() {
        let rows = detect_hotspots(&cluster(), HotspotPass { precision: 3, min_density: 1 });
        assert!(rows.windows(2).all(|w| w[0].density >= w[1].density));
        assert_eq!(rows.iter().map(|r| r.density).sum::<usize>(), 6);
    }
}
