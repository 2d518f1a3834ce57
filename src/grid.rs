//! Multi-level grid aggregation of track points.
//!
//! Bins time-ordered GPS samples into Web Mercator tiles at several zoom
//! levels and accumulates, per tile:
//! - Raw sample count and distinct visit episodes
//! - Dwell time inside each episode
//! - First / last visit, speed statistics, dominant transport mode
//! - The most common administrative labels
//!
//! The resulting [`GridCell`]s are what the density classifier ranks.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{Bounds, GpsPoint};

/// Highest zoom level accepted.
pub const MAX_LEVEL: u8 = 22;

/// Web Mercator latitude limit.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// A raw GPS sample with the visit metadata the aggregation uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: Option<f64>,
    /// Transport mode label, e.g. "walk", "car"
    pub mode: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    /// Flagged by upstream outlier detection; skipped here
    #[serde(default)]
    pub outlier: bool,
}

impl TrackPoint {
    pub fn new(timestamp: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            speed_kmh: None,
            mode: None,
            province: None,
            city: None,
            county: None,
            outlier: false,
        }
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Web Mercator tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    pub level: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    /// Tile containing the coordinate at `level`.
    ///
    /// Latitudes beyond the Mercator limit land in the top or bottom row, and
    /// longitude 180 lands in the last column.
    pub fn from_point(lat: f64, lon: f64, level: u8) -> Self {
        let level = level.min(MAX_LEVEL);
        let n = (1u64 << level) as f64;
        let max_index = (1u64 << level) - 1;

        let x = ((lon + 180.0) / 360.0 * n).floor();
        let lat_rad = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

        Self {
            level,
            x: (x.max(0.0) as u64).min(max_index) as u32,
            y: (y.max(0.0) as u64).min(max_index) as u32,
        }
    }

    /// Geographic extent of the tile.
    pub fn bounds(&self) -> Bounds {
        let n = (1u64 << self.level) as f64;
        Bounds {
            min_lat: tile_y_to_lat(self.y as f64 + 1.0, n),
            max_lat: tile_y_to_lat(self.y as f64, n),
            min_lng: self.x as f64 / n * 360.0 - 180.0,
            max_lng: (self.x as f64 + 1.0) / n * 360.0 - 180.0,
        }
    }

    pub fn center(&self) -> GpsPoint {
        self.bounds().center()
    }

    /// Parse an identifier of the form `L{level}_{x}_{y}`.
    pub fn parse(grid_id: &str) -> Option<Self> {
        let rest = grid_id.strip_prefix('L')?;
        let mut parts = rest.splitn(3, '_');
        let level: u8 = parts.next()?.parse().ok()?;
        let x: u32 = parts.next()?.parse().ok()?;
        let y: u32 = parts.next()?.parse().ok()?;
        if level > MAX_LEVEL {
            return None;
        }
        Some(Self { level, x, y })
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}_{}_{}", self.level, self.x, self.y)
    }
}

fn tile_y_to_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// One cell of the discretized map at a fixed zoom level.
///
/// Produced by [`aggregate_points`] (or loaded from a store); read-only to the
/// classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// `L{level}_{x}_{y}`
    pub grid_id: String,
    pub level: u8,
    pub x: u32,
    pub y: u32,
    pub center: GpsPoint,
    pub bounds: Bounds,
    /// Raw GPS samples falling in the cell
    pub point_count: u64,
    /// Distinct visit episodes
    pub visit_count: u64,
    /// Cumulative dwell time
    pub total_duration_seconds: i64,
    pub first_visit: Option<i64>,
    pub last_visit: Option<i64>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub avg_speed_kmh: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub dominant_mode: Option<String>,
}

impl GridCell {
    /// An empty cell for `tile`, with geometry filled in and zeroed statistics.
    pub fn new(tile: TileId) -> Self {
        let bounds = tile.bounds();
        Self {
            grid_id: tile.to_string(),
            level: tile.level,
            x: tile.x,
            y: tile.y,
            center: bounds.center(),
            bounds,
            point_count: 0,
            visit_count: 0,
            total_duration_seconds: 0,
            first_visit: None,
            last_visit: None,
            province: None,
            city: None,
            county: None,
            avg_speed_kmh: None,
            max_speed_kmh: None,
            dominant_mode: None,
        }
    }

    pub fn tile(&self) -> TileId {
        TileId { level: self.level, x: self.x, y: self.y }
    }
}

/// Configuration for grid aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Zoom levels to aggregate (default: 8, 10, 12, 15)
    pub levels: Vec<u8>,
    /// A return to the same cell after more than this many seconds starts a new visit
    /// (default: 1800)
    pub visit_gap_seconds: i64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            levels: vec![8, 10, 12, 15],
            visit_gap_seconds: 1800,
        }
    }
}

// Internal cell data during construction
#[derive(Debug, Default)]
struct CellBuilder {
    point_count: u64,
    visit_count: u64,
    duration: i64,
    first_visit: Option<i64>,
    last_visit: Option<i64>,
    speed_sum: f64,
    speed_samples: u64,
    max_speed: Option<f64>,
    modes: HashMap<String, u64>,
    provinces: HashMap<String, u64>,
    cities: HashMap<String, u64>,
    counties: HashMap<String, u64>,
}

impl CellBuilder {
    fn add(&mut self, point: &TrackPoint) {
        self.point_count += 1;
        self.first_visit = Some(self.first_visit.map_or(point.timestamp, |v| v.min(point.timestamp)));
        self.last_visit = Some(self.last_visit.map_or(point.timestamp, |v| v.max(point.timestamp)));

        if let Some(speed) = point.speed_kmh.filter(|s| s.is_finite()) {
            self.speed_sum += speed;
            self.speed_samples += 1;
            self.max_speed = Some(self.max_speed.map_or(speed, |m| m.max(speed)));
        }

        count_label(&mut self.modes, point.mode.as_deref());
        count_label(&mut self.provinces, point.province.as_deref());
        count_label(&mut self.cities, point.city.as_deref());
        count_label(&mut self.counties, point.county.as_deref());
    }

    fn build(self, tile: TileId) -> GridCell {
        let mut cell = GridCell::new(tile);
        cell.point_count = self.point_count;
        cell.visit_count = self.visit_count;
        cell.total_duration_seconds = self.duration;
        cell.first_visit = self.first_visit;
        cell.last_visit = self.last_visit;
        cell.avg_speed_kmh = (self.speed_samples > 0).then(|| self.speed_sum / self.speed_samples as f64);
        cell.max_speed_kmh = self.max_speed;
        cell.dominant_mode = most_frequent(&self.modes);
        cell.province = most_frequent(&self.provinces);
        cell.city = most_frequent(&self.cities);
        cell.county = most_frequent(&self.counties);
        cell
    }
}

fn count_label(counts: &mut HashMap<String, u64>, label: Option<&str>) {
    if let Some(label) = label.filter(|l| !l.is_empty()) {
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }
}

/// Most frequent label; ties go to the lexicographically smallest.
fn most_frequent(counts: &HashMap<String, u64>) -> Option<String> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(label, _)| label.clone())
}

/// Aggregate track points into grid cells at every configured level.
///
/// Outliers and points with invalid coordinates are skipped. Points are
/// processed in timestamp order (stable for equal timestamps) regardless of
/// input order. Output is sorted by level, then x, then y.
///
/// # Example
///
/// ```rust
/// use footprint_spatial::{TrackPoint, GridConfig, aggregate_points};
///
/// let points = vec![
///     TrackPoint::new(0, 37.8324, 112.5503),
///     TrackPoint::new(60, 37.8325, 112.5504),
/// ];
/// let config = GridConfig { levels: vec![12], ..GridConfig::default() };
/// let cells = aggregate_points(&points, &config);
///
/// assert_eq!(cells.len(), 1);
/// assert_eq!(cells[0].point_count, 2);
/// assert_eq!(cells[0].visit_count, 1);
/// assert_eq!(cells[0].total_duration_seconds, 60);
/// ```
pub fn aggregate_points(points: &[TrackPoint], config: &GridConfig) -> Vec<GridCell> {
    let mut ordered: Vec<&TrackPoint> = points
        .iter()
        .filter(|p| !p.outlier && p.point().is_valid())
        .collect();
    ordered.sort_by_key(|p| p.timestamp);

    let skipped = points.len() - ordered.len();
    if skipped > 0 {
        info!("[GridAggregator] Skipped {} outlier or invalid points", skipped);
    }

    let mut levels: Vec<u8> = config.levels.clone();
    levels.sort_unstable();
    levels.dedup();
    levels.retain(|&level| {
        if level > MAX_LEVEL {
            warn!("[GridAggregator] Ignoring level {} (max {})", level, MAX_LEVEL);
            false
        } else {
            true
        }
    });

    let gap = config.visit_gap_seconds;

    #[cfg(feature = "parallel")]
    let per_level: Vec<Vec<GridCell>> = {
        use rayon::prelude::*;
        levels
            .par_iter()
            .map(|&level| aggregate_level(&ordered, level, gap))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let per_level: Vec<Vec<GridCell>> = levels
        .iter()
        .map(|&level| aggregate_level(&ordered, level, gap))
        .collect();

    let cells: Vec<GridCell> = per_level.into_iter().flatten().collect();
    info!(
        "[GridAggregator] Aggregated {} points into {} cells across {} levels",
        ordered.len(),
        cells.len(),
        levels.len()
    );
    cells
}

fn aggregate_level(points: &[&TrackPoint], level: u8, visit_gap_seconds: i64) -> Vec<GridCell> {
    let mut builders: HashMap<TileId, CellBuilder> = HashMap::new();
    let mut previous: Option<(TileId, i64)> = None;

    for point in points {
        let tile = TileId::from_point(point.latitude, point.longitude, level);
        let builder = builders.entry(tile).or_default();
        builder.add(point);

        match previous {
            Some((prev_tile, prev_ts))
                if prev_tile == tile && point.timestamp - prev_ts <= visit_gap_seconds =>
            {
                builder.duration += point.timestamp - prev_ts;
            }
            _ => builder.visit_count += 1,
        }
        previous = Some((tile, point.timestamp));
    }

    let mut cells: Vec<GridCell> = builders
        .into_iter()
        .map(|(tile, builder)| builder.build(tile))
        .collect();
    cells.sort_by_key(|c| c.tile());

    debug!("[GridAggregator] Level {}: {} cells", level, cells.len());
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: (f64, f64) = (37.8324, 112.5503);
    const WORK: (f64, f64) = (37.8700, 112.5600);

    fn at(ts: i64, (lat, lon): (f64, f64)) -> TrackPoint {
        TrackPoint::new(ts, lat, lon)
    }

    fn level_15() -> GridConfig {
        GridConfig { levels: vec![15], ..GridConfig::default() }
    }

    fn cell<'a>(cells: &'a [GridCell], (lat, lon): (f64, f64)) -> &'a GridCell {
        let id = TileId::from_point(lat, lon, 15).to_string();
        cells.iter().find(|c| c.grid_id == id).unwrap()
    }

    #[test]
    fn test_tile_from_point() {
        assert_eq!(TileId::from_point(HOME.0, HOME.1, 10), TileId { level: 10, x: 832, y: 395 });
        assert_eq!(TileId::from_point(HOME.0, HOME.1, 15), TileId { level: 15, x: 26628, y: 12658 });
        assert_eq!(TileId::from_point(0.0, 0.0, 1), TileId { level: 1, x: 1, y: 1 });
        assert_eq!(TileId::from_point(-33.8688, 151.2093, 8), TileId { level: 8, x: 235, y: 153 });
    }

    #[test]
    fn test_tile_edges_clamped() {
        let east = TileId::from_point(0.0, 180.0, 4);
        assert_eq!(east.x, 15);
        let north = TileId::from_point(90.0, 0.0, 4);
        assert_eq!(north.y, 0);
        let south = TileId::from_point(-90.0, 0.0, 4);
        assert_eq!(south.y, 15);
    }

    #[test]
    fn test_tile_bounds_contain_point() {
        let tile = TileId::from_point(HOME.0, HOME.1, 12);
        let b = tile.bounds();
        assert!(b.contains(&GpsPoint::new(HOME.0, HOME.1)));
        assert!(b.min_lat < b.max_lat && b.min_lng < b.max_lng);
    }

    #[test]
    fn test_grid_id_round_trip() {
        let tile = TileId { level: 12, x: 3329, y: 1580 };
        assert_eq!(tile.to_string(), "L12_3329_1580");
        assert_eq!(TileId::parse("L12_3329_1580"), Some(tile));
        assert_eq!(TileId::parse("12_3329_1580"), None);
        assert_eq!(TileId::parse("L40_1_1"), None);
        assert_eq!(TileId::parse("L12_x_1"), None);
    }

    #[test]
    fn test_visit_episodes_and_dwell() {
        let points = vec![
            at(0, HOME),
            at(60, HOME),
            at(120, HOME),
            at(180, WORK),
            at(240, HOME),
            at(10_000, HOME), // long gap: new visit
        ];
        let cells = aggregate_points(&points, &level_15());
        assert_eq!(cells.len(), 2);

        let home = cell(&cells, HOME);
        assert_eq!(home.point_count, 5);
        assert_eq!(home.visit_count, 3);
        assert_eq!(home.total_duration_seconds, 120);
        assert_eq!(home.first_visit, Some(0));
        assert_eq!(home.last_visit, Some(10_000));

        let work = cell(&cells, WORK);
        assert_eq!(work.point_count, 1);
        assert_eq!(work.visit_count, 1);
        assert_eq!(work.total_duration_seconds, 0);
    }

    #[test]
    fn test_unordered_input_is_sorted() {
        let ordered = vec![at(0, HOME), at(60, HOME), at(120, WORK)];
        let shuffled = vec![at(120, WORK), at(0, HOME), at(60, HOME)];
        assert_eq!(aggregate_points(&ordered, &level_15()), aggregate_points(&shuffled, &level_15()));
    }

    #[test]
    fn test_outliers_and_invalid_skipped() {
        let mut outlier = at(30, WORK);
        outlier.outlier = true;
        let points = vec![at(0, HOME), outlier, at(60, HOME), at(90, (f64::NAN, 0.0)), at(100, (95.0, 0.0))];
        let cells = aggregate_points(&points, &level_15());
        assert_eq!(cells.len(), 1);
        // The outlier does not break the episode.
        assert_eq!(cells[0].visit_count, 1);
        assert_eq!(cells[0].total_duration_seconds, 60);
    }

    #[test]
    fn test_movement_and_labels() {
        let mut a = at(0, HOME);
        a.speed_kmh = Some(4.0);
        a.mode = Some("walk".into());
        a.city = Some("Taiyuan".into());
        let mut b = at(30, HOME);
        b.speed_kmh = Some(40.0);
        b.mode = Some("car".into());
        b.city = Some("Taiyuan".into());
        let mut c = at(60, HOME);
        c.mode = Some("walk".into());
        c.province = Some(String::new());

        let cells = aggregate_points(&[a, b, c], &level_15());
        let home = &cells[0];
        assert_eq!(home.avg_speed_kmh, Some(22.0));
        assert_eq!(home.max_speed_kmh, Some(40.0));
        assert_eq!(home.dominant_mode.as_deref(), Some("walk"));
        assert_eq!(home.city.as_deref(), Some("Taiyuan"));
        assert_eq!(home.province, None);
    }

    #[test]
    fn test_mode_tie_breaks_alphabetically() {
        let mut a = at(0, HOME);
        a.mode = Some("walk".into());
        let mut b = at(10, HOME);
        b.mode = Some("bike".into());
        let cells = aggregate_points(&[a, b], &level_15());
        assert_eq!(cells[0].dominant_mode.as_deref(), Some("bike"));
    }

    #[test]
    fn test_multiple_levels_sorted_and_deduped() {
        let config = GridConfig { levels: vec![15, 8, 15, 40], ..GridConfig::default() };
        let cells = aggregate_points(&[at(0, HOME), at(60, WORK)], &config);
        let levels: Vec<u8> = cells.iter().map(|c| c.level).collect();
        // Both points share the level-8 tile, but not the level-15 one.
        assert_eq!(levels, vec![8, 15, 15]);
        assert_eq!(cells[0].point_count, 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_points(&[], &GridConfig::default()).is_empty());
    }
}
