//! Heatmap generation over aggregated grid cells.
//!
//! Produces a sparse, render-ready view of one grid level:
//! - Normalized density per cell (visit count / busiest cell)
//! - Raw point, visit and dwell totals for drill-down
//! - Optional HOT / WARM / COLD tier from classified zones
//!
//! Cells are precomputed so a map layer can draw them without further math.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{Bounds, DensityZone, GpsPoint, GridCell, TileId, ZoneType};

/// Configuration for heatmap generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Grid level to render (default: 15, roughly 1 km cells)
    pub level: u8,
    /// Optional bounds; cells whose center falls outside are skipped
    pub bounds: Option<Bounds>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self { level: 15, bounds: None }
    }
}

/// A single cell in the heatmap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub grid_id: String,
    /// Tile column
    pub x: u32,
    /// Tile row
    pub y: u32,
    /// Cell center for rendering
    pub center: GpsPoint,
    /// Normalized density (0.0-1.0) for color mapping
    pub density: f64,
    pub visit_count: u64,
    pub point_count: u64,
    pub total_duration_seconds: i64,
    /// Earliest visit (Unix timestamp)
    pub first_visit: Option<i64>,
    /// Most recent visit (Unix timestamp)
    pub last_visit: Option<i64>,
    /// Tier from a zone overlay, if one was applied
    pub zone_type: Option<ZoneType>,
}

/// Complete heatmap result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapResult {
    /// Non-empty cells only, ordered by x then y
    pub cells: Vec<HeatmapCell>,
    pub level: u8,
    /// Union of the rendered cells' boxes
    pub bounds: Bounds,
    /// Grid dimensions spanned by the cells
    pub grid_rows: u32,
    pub grid_cols: u32,
    /// Busiest cell's visit count, used for normalization
    pub max_visit_count: u64,
    pub total_points: u64,
}

/// Query result when user taps a location
#[derive(Debug, Clone, PartialEq)]
pub struct CellQueryResult {
    /// The cell at the queried location
    pub cell: HeatmapCell,
    /// Suggested label based on visits and tier
    pub suggested_label: String,
}

impl HeatmapResult {
    fn empty(level: u8) -> Self {
        Self {
            cells: vec![],
            level,
            bounds: Bounds { min_lat: 0.0, max_lat: 0.0, min_lng: 0.0, max_lng: 0.0 },
            grid_rows: 0,
            grid_cols: 0,
            max_visit_count: 0,
            total_points: 0,
        }
    }

    /// Attach zone tiers to matching cells by grid id.
    ///
    /// When a grid id appears under several buckets the first zone wins.
    pub fn overlay_zones(&mut self, zones: &[DensityZone]) {
        let mut tiers: HashMap<&str, ZoneType> = HashMap::with_capacity(zones.len());
        for zone in zones {
            tiers.entry(zone.grid_id.as_str()).or_insert(zone.zone_type);
        }

        let mut matched = 0;
        for cell in &mut self.cells {
            cell.zone_type = tiers.get(cell.grid_id.as_str()).copied();
            if cell.zone_type.is_some() {
                matched += 1;
            }
        }
        debug!("[Heatmap] Zone overlay matched {} of {} cells", matched, self.cells.len());
    }
}

/// Generate a heatmap from grid cells at `config.level`.
///
/// Cells from other levels are ignored.
pub fn generate_heatmap(cells: &[GridCell], config: &HeatmapConfig) -> HeatmapResult {
    let selected: Vec<&GridCell> = cells
        .iter()
        .filter(|c| c.level == config.level)
        .filter(|c| config.bounds.map_or(true, |b| b.contains(&c.center)))
        .collect();

    if selected.is_empty() {
        return HeatmapResult::empty(config.level);
    }

    let max_visit_count = selected.iter().map(|c| c.visit_count).max().unwrap_or(0);

    let mut heat_cells: Vec<HeatmapCell> = selected
        .iter()
        .map(|c| HeatmapCell {
            grid_id: c.grid_id.clone(),
            x: c.x,
            y: c.y,
            center: c.center,
            density: if max_visit_count > 0 {
                c.visit_count as f64 / max_visit_count as f64
            } else {
                0.0
            },
            visit_count: c.visit_count,
            point_count: c.point_count,
            total_duration_seconds: c.total_duration_seconds,
            first_visit: c.first_visit,
            last_visit: c.last_visit,
            zone_type: None,
        })
        .collect();
    heat_cells.sort_by_key(|c| (c.x, c.y));

    let mut bounds = selected[0].bounds;
    for c in &selected[1..] {
        bounds.min_lat = bounds.min_lat.min(c.bounds.min_lat);
        bounds.max_lat = bounds.max_lat.max(c.bounds.max_lat);
        bounds.min_lng = bounds.min_lng.min(c.bounds.min_lng);
        bounds.max_lng = bounds.max_lng.max(c.bounds.max_lng);
    }

    let min_x = heat_cells.iter().map(|c| c.x).min().unwrap_or(0);
    let max_x = heat_cells.iter().map(|c| c.x).max().unwrap_or(0);
    let min_y = heat_cells.iter().map(|c| c.y).min().unwrap_or(0);
    let max_y = heat_cells.iter().map(|c| c.y).max().unwrap_or(0);

    debug!(
        "[Heatmap] Level {}: {} cells, max visits {}",
        config.level,
        heat_cells.len(),
        max_visit_count
    );

    HeatmapResult {
        total_points: heat_cells.iter().map(|c| c.point_count).sum(),
        cells: heat_cells,
        level: config.level,
        bounds,
        grid_rows: max_y - min_y + 1,
        grid_cols: max_x - min_x + 1,
        max_visit_count,
    }
}

/// Query the heatmap at a specific location
pub fn query_heatmap_cell(heatmap: &HeatmapResult, lat: f64, lng: f64) -> Option<CellQueryResult> {
    if heatmap.cells.is_empty() || !GpsPoint::new(lat, lng).is_valid() {
        return None;
    }

    let target = TileId::from_point(lat, lng, heatmap.level);
    let cell = heatmap.cells.iter().find(|c| c.x == target.x && c.y == target.y)?;

    let mut suggested_label = match (cell.zone_type, cell.visit_count) {
        (_, 0) => "Passed through".to_string(),
        (None, 1) => "Visited once".to_string(),
        (None, n) => format!("{} visits", n),
        (Some(ZoneType::Hot), n) => format!("Hot spot ({} visits)", n),
        (Some(ZoneType::Warm), n) => format!("Regular spot ({} visits)", n),
        (Some(ZoneType::Cold), n) => format!("Occasional spot ({} visits)", n),
    };
    if cell.total_duration_seconds >= 3600 {
        suggested_label.push_str(&format!(", {:.1} h", cell.total_duration_seconds as f64 / 3600.0));
    }

    Some(CellQueryResult {
        cell: cell.clone(),
        suggested_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify_cells;

    const HOME: (f64, f64) = (37.8324, 112.5503);
    const WORK: (f64, f64) = (37.8700, 112.5600);

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn make_cell((lat, lng): (f64, f64), level: u8, visits: u64, points: u64) -> GridCell {
        let mut cell = GridCell::new(TileId::from_point(lat, lng, level));
        cell.visit_count = visits;
        cell.point_count = points;
        cell
    }

    fn sample_cells() -> Vec<GridCell> {
        vec![
            make_cell(HOME, 15, 8, 40),
            make_cell(WORK, 15, 2, 12),
            make_cell(HOME, 10, 10, 52),
        ]
    }

    #[test]
    fn test_empty_heatmap() {
        let result = generate_heatmap(&[], &HeatmapConfig::default());
        assert!(result.cells.is_empty());
        assert_eq!(result.grid_rows, 0);
        assert!(query_heatmap_cell(&result, HOME.0, HOME.1).is_none());
    }

    #[test]
    fn test_single_level_density() {
        let result = generate_heatmap(&sample_cells(), &HeatmapConfig::default());

        assert_eq!(result.cells.len(), 2);
        assert_eq!(result.max_visit_count, 8);
        assert_eq!(result.total_points, 52);
        assert!(approx_eq(result.cells[0].density, 1.0, 1e-12));
        assert!(approx_eq(result.cells[1].density, 0.25, 1e-12));

        // HOME (26628, 12658) and WORK (26629, 12654)
        assert_eq!(result.grid_cols, 2);
        assert_eq!(result.grid_rows, 5);
        assert!(result.bounds.contains(&GpsPoint::new(HOME.0, HOME.1)));
        assert!(result.bounds.contains(&GpsPoint::new(WORK.0, WORK.1)));
    }

    #[test]
    fn test_bounds_filter() {
        let config = HeatmapConfig {
            level: 15,
            bounds: Some(Bounds { min_lat: 37.80, max_lat: 37.85, min_lng: 112.50, max_lng: 112.60 }),
        };
        let result = generate_heatmap(&sample_cells(), &config);
        assert_eq!(result.cells.len(), 1);
        assert_eq!(result.cells[0].visit_count, 8);
    }

    #[test]
    fn test_zone_overlay_and_query() {
        let cells = sample_cells();
        let mut result = generate_heatmap(&cells, &HeatmapConfig::default());
        let level_15: Vec<GridCell> = cells.into_iter().filter(|c| c.level == 15).collect();
        result.overlay_zones(&classify_cells(&level_15, "all", "v1"));

        let home = query_heatmap_cell(&result, HOME.0, HOME.1).unwrap();
        assert_eq!(home.cell.zone_type, Some(ZoneType::Hot));
        assert_eq!(home.suggested_label, "Hot spot (8 visits)");

        let work = query_heatmap_cell(&result, WORK.0, WORK.1).unwrap();
        assert_eq!(work.cell.zone_type, Some(ZoneType::Cold));

        assert!(query_heatmap_cell(&result, -33.8688, 151.2093).is_none());
    }

    #[test]
    fn test_label_without_overlay() {
        let mut cell = make_cell(HOME, 15, 1, 3);
        cell.total_duration_seconds = 5400;
        let result = generate_heatmap(&[cell], &HeatmapConfig::default());

        let hit = query_heatmap_cell(&result, HOME.0, HOME.1).unwrap();
        assert_eq!(hit.suggested_label, "Visited once, 1.5 h");
    }

    #[test]
    fn test_config_from_json() {
        let config: HeatmapConfig = serde_json::from_str(r#"{"level": 12}"#).unwrap();
        assert_eq!(config.level, 12);
        assert!(config.bounds.is_none());
    }
}
