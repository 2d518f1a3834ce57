//! Density scoring and tier classification of grid cells.
//!
//! Pure computation: no storage, no logging. The batch job around it lives in
//! [`crate::classifier`].
//!
//! ## Algorithm
//! 1. Sort the visit counts of all cells descending (stable)
//! 2. `hot = sorted[n / 10]`, `warm = sorted[3n / 10]` (floor-division indices)
//! 3. `density_score = visit_count / max_visit_count`
//! 4. `>= hot` is HOT, else `>= warm` is WARM, else COLD
//!
//! The thresholds are positional, not interpolated percentiles. With fewer than
//! ten cells `n / 10` is 0, so only cells tied with the maximum are HOT.
//! Scores and tiers depend only on the batch they were computed from.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{GpsPoint, GridCell};

/// Discrete density tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneType {
    Hot,
    Warm,
    Cold,
}

impl ZoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneType::Hot => "HOT",
            ZoneType::Warm => "WARM",
            ZoneType::Cold => "COLD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HOT" => Some(ZoneType::Hot),
            "WARM" => Some(ZoneType::Warm),
            "COLD" => Some(ZoneType::Cold),
            _ => None,
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visit-count boundaries derived from one batch of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneThresholds {
    /// Visit count at index `n / 10` of the descending sort
    pub hot: u64,
    /// Visit count at index `3n / 10` of the descending sort
    pub warm: u64,
    pub max_visit_count: u64,
}

impl ZoneThresholds {
    /// Compute thresholds from a batch's visit counts. `None` when empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use footprint_spatial::{ZoneThresholds, ZoneType};
    ///
    /// let t = ZoneThresholds::from_visit_counts(&[10, 5, 1]).unwrap();
    /// assert_eq!((t.hot, t.warm, t.max_visit_count), (10, 10, 10));
    /// assert_eq!(t.classify(5), ZoneType::Cold);
    /// assert_eq!(t.density_score(5), 0.5);
    /// ```
    pub fn from_visit_counts(visit_counts: &[u64]) -> Option<Self> {
        if visit_counts.is_empty() {
            return None;
        }

        let mut sorted = visit_counts.to_vec();
        // slice::sort_by is stable
        sorted.sort_by(|a, b| b.cmp(a));

        let n = sorted.len();
        Some(Self {
            hot: sorted[n / 10],
            warm: sorted[n * 3 / 10],
            max_visit_count: sorted[0],
        })
    }

    pub fn classify(&self, visit_count: u64) -> ZoneType {
        if visit_count >= self.hot {
            ZoneType::Hot
        } else if visit_count >= self.warm {
            ZoneType::Warm
        } else {
            ZoneType::Cold
        }
    }

    /// `visit_count / max_visit_count`, or 0 when the maximum is 0.
    pub fn density_score(&self, visit_count: u64) -> f64 {
        if self.max_visit_count == 0 {
            return 0.0;
        }
        visit_count as f64 / self.max_visit_count as f64
    }
}

/// Classification record for one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityZone {
    pub grid_id: String,
    /// Aggregation bucket, "all" for whole-history runs
    pub bucket_type: String,
    pub level: u8,
    pub center: GpsPoint,
    /// In `[0, 1]`, relative to the batch maximum
    pub density_score: f64,
    pub zone_type: ZoneType,
    pub point_count: u64,
    pub visit_count: u64,
    pub total_duration_seconds: i64,
    pub province: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub algo_version: String,
}

/// Score and classify every cell with `visit_count > 0`.
///
/// Zones come back in input order. Cells without visits are not eligible and
/// produce no zone.
pub fn classify_cells(cells: &[GridCell], bucket_type: &str, algo_version: &str) -> Vec<DensityZone> {
    let eligible: Vec<&GridCell> = cells.iter().filter(|c| c.visit_count > 0).collect();
    let counts: Vec<u64> = eligible.iter().map(|c| c.visit_count).collect();

    let Some(thresholds) = ZoneThresholds::from_visit_counts(&counts) else {
        return Vec::new();
    };

    eligible
        .into_iter()
        .map(|cell| DensityZone {
            grid_id: cell.grid_id.clone(),
            bucket_type: bucket_type.to_string(),
            level: cell.level,
            center: cell.center,
            density_score: thresholds.density_score(cell.visit_count),
            zone_type: thresholds.classify(cell.visit_count),
            point_count: cell.point_count,
            visit_count: cell.visit_count,
            total_duration_seconds: cell.total_duration_seconds,
            province: cell.province.clone(),
            city: cell.city.clone(),
            county: cell.county.clone(),
            algo_version: algo_version.to_string(),
        })
        .collect()
}

/// Completion summary of a classification run.
///
/// Serializes as `{"total_zones", "hot_zones", "warm_zones", "cold_zones"}`, or
/// `{"zones": 0}` when there was nothing to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunSummary {
    Classified {
        total_zones: usize,
        hot_zones: usize,
        warm_zones: usize,
        cold_zones: usize,
    },
    Empty {
        zones: usize,
    },
}

impl RunSummary {
    pub fn empty() -> Self {
        RunSummary::Empty { zones: 0 }
    }

    pub fn from_zones(zones: &[DensityZone]) -> Self {
        if zones.is_empty() {
            return Self::empty();
        }

        let count = |t: ZoneType| zones.iter().filter(|z| z.zone_type == t).count();
        RunSummary::Classified {
            total_zones: zones.len(),
            hot_zones: count(ZoneType::Hot),
            warm_zones: count(ZoneType::Warm),
            cold_zones: count(ZoneType::Cold),
        }
    }

    pub fn total_zones(&self) -> usize {
        match self {
            RunSummary::Classified { total_zones, .. } => *total_zones,
            RunSummary::Empty { zones } => *zones,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match *self {
            RunSummary::Classified { total_zones, hot_zones, warm_zones, cold_zones } => json!({
                "total_zones": total_zones,
                "hot_zones": hot_zones,
                "warm_zones": warm_zones,
                "cold_zones": cold_zones,
            }),
            RunSummary::Empty { zones } => json!({ "zones": zones }),
        }
    }
}
