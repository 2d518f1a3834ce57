//! # Footprint Spatial
//!
//! Spatial core for a lifetime of GPS footprints.
//!
//! This library provides:
//! - Great-circle geodesy (distance, bearing, destination, midpoint)
//! - Point-set geometry and circular statistics for headings
//! - A geohash codec compatible with the standard base-32 geohash
//! - Multi-level grid aggregation of raw track points into Web Mercator cells
//! - Density classification of grid cells into HOT / WARM / COLD zones
//! - Heatmap-ready aggregates and a spatial index over classified zones
//!
//! ## Features
//!
//! - **`parallel`** - Aggregate grid levels in parallel with rayon
//! - **`persistence`** - SQLite-backed [`store::SpatialStore`] implementation
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use footprint_spatial::{geodesy, geohash, GpsPoint};
//!
//! let home = GpsPoint::new(37.8324, 112.5503);
//! let work = GpsPoint::new(37.8700, 112.5600);
//!
//! let meters = geodesy::distance(&home, &work);
//! assert!(meters > 4000.0 && meters < 4500.0);
//!
//! let key = geohash::encode(home.latitude, home.longitude, 5);
//! assert_eq!(key, "ww8p1");
//! assert_eq!(geohash::neighbors(&key).len(), 8);
//! ```

use serde::{Deserialize, Serialize};

pub mod circular;
pub mod geodesy;
pub mod geohash;
pub mod geometry;

pub mod grid;
pub use grid::{GridCell, GridConfig, TileId, TrackPoint, aggregate_points};

pub mod density;
pub use density::{DensityZone, RunSummary, ZoneThresholds, ZoneType, classify_cells};

pub mod store;
pub use store::{MemoryStore, SpatialStore, StoreError};

#[cfg(feature = "persistence")]
pub mod persistence;

#[cfg(feature = "persistence")]
pub use persistence::SqliteStore;

pub mod classifier;
pub use classifier::{
    AnalysisRun, CancellationToken, ClassifierConfig, ClassifierError, DensityClassifier,
    RunLocks, RunMode, RunStatus,
};

pub mod registry;
pub use registry::{
    Analyzer, AnalyzerFactory, AnalyzerRegistry, GridSystemAnalyzer, RegistryError, default_registry,
};

pub mod heatmap;
pub use heatmap::{
    CellQueryResult, HeatmapCell, HeatmapConfig, HeatmapResult, generate_heatmap, query_heatmap_cell,
};

pub mod zone_index;
pub use zone_index::ZoneIndex;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees.
///
/// # Example
/// ```
/// use footprint_spatial::GpsPoint;
/// let point = GpsPoint::new(37.8324, 112.5503); // Taiyuan
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

impl From<GpsPoint> for geo::Point<f64> {
    fn from(p: GpsPoint) -> Self {
        geo::Point::new(p.longitude, p.latitude)
    }
}

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: &GpsPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }

    /// Latitude span in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude span in degrees.
    pub fn width(&self) -> f64 {
        self.max_lng - self.min_lng
    }
}
