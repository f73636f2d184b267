// Tunables consumed by the pipeline.
//
// Every field has a default matching the historical batch scripts, so an
// empty (or absent) TOML file yields the standard run.
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub severity: SeverityThresholds,
    pub hotspots: HotspotPasses,
    /// Groups of the (comuna, type, hour) view smaller than this are dropped.
    pub min_composite_group: usize,
    /// Match incident types ignoring case. Off by default: only the exact
    /// lower-case spellings are recognised.
    pub case_insensitive_types: bool,
    /// Lower-case comuna spelling -> canonical name.
    pub comuna_aliases: BTreeMap<String, String>,
    pub bounds: Option<BoundingBox>,
    pub write_headers: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SeverityThresholds {
    /// Severity at or above this is HIGH, and counts as critical.
    pub high: i32,
    pub medium: i32,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        SeverityThresholds { high: 7, medium: 4 }
    }
}

/// One hotspot selectivity pass: rounding precision and minimum density.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HotspotPass {
    pub precision: u32,
    pub min_density: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HotspotPasses {
    pub fine: HotspotPass,
    pub coarse: HotspotPass,
}

impl Default for HotspotPasses {
    fn default() -> Self {
        HotspotPasses {
            fine: HotspotPass { precision: 3, min_density: 3 },
            coarse: HotspotPass { precision: 2, min_density: 5 },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

pub fn default_comuna_aliases() -> BTreeMap<String, String> {
    [
        ("santiago", "Santiago"),
        ("las condes", "Las Condes"),
        ("providencia", "Providencia"),
        ("ñuñoa", "Ñuñoa"),
        ("maipú", "Maipú"),
        ("maipu", "Maipú"),
        ("la florida", "La Florida"),
        ("puente alto", "Puente Alto"),
        ("peñalolén", "Peñalolén"),
        ("penalolen", "Peñalolén"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            severity: SeverityThresholds::default(),
            hotspots: HotspotPasses::default(),
            min_composite_group: 2,
            case_insensitive_types: false,
            comuna_aliases: default_comuna_aliases(),
            bounds: None,
            write_headers: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.severity.medium > self.severity.high {
            return Err(ConfigError::Invalid {
                field: "severity.medium",
                message: format!(
                    "{} is above severity.high ({})",
                    self.severity.medium, self.severity.high
                ),
            });
        }
        for (name, pass) in [("hotspots.fine", self.hotspots.fine), ("hotspots.coarse", self.hotspots.coarse)] {
            // 10^p must stay representable when scaling coordinates.
            if pass.precision > 9 {
                return Err(ConfigError::Invalid {
                    field: name,
                    message: format!("precision {} exceeds 9 decimals", pass.precision),
                });
            }
        }
        Ok(())
    }
}
