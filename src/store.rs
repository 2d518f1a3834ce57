//! Storage seam between the spatial core and whatever persists its data.
//!
//! The core never builds queries itself. It reads track points and grid cells
//! through [`SpatialStore`] and hands back grid cells and density zones to
//! write. [`MemoryStore`] keeps everything in process; the SQLite-backed store
//! lives in `persistence` behind the `persistence` feature.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::{DensityZone, GridCell, TrackPoint};

/// Default name of the density zone table.
pub const DEFAULT_ZONE_TABLE: &str = "spatial_density_grid_stats";

/// Name of the grid cell table.
pub const GRID_CELL_TABLE: &str = "grid_cells";

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading from the backing store failed.
    #[error("Query error: {message}")]
    Query {
        /// Description of what went wrong.
        message: String,
    },

    /// A write was rejected.
    #[error("Write error: {message}")]
    Write {
        /// Description of what went wrong.
        message: String,
    },

    /// Beginning or committing a transaction failed.
    #[error("Transaction error: {message}")]
    Transaction {
        /// Description of what went wrong.
        message: String,
    },

    /// SQLite driver error.
    #[cfg(feature = "persistence")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Everything the analyzers need from persistence.
///
/// Implementations must make [`write_zones`](SpatialStore::write_zones) and
/// [`write_grid_cells`](SpatialStore::write_grid_cells) all-or-nothing: on
/// error, none of the batch may be visible.
pub trait SpatialStore: Send + Sync {
    /// Name of the zone table.
    fn zone_table(&self) -> &str;

    /// Identity of the zone table for run locking.
    ///
    /// Runs whose stores report the same key are serialized. The default is the
    /// zone table name, so two stores sharing a table name block each other
    /// unless they override this with something that tells their databases
    /// apart.
    fn lock_key(&self) -> String {
        self.zone_table().to_string()
    }

    /// All track points, ordered by timestamp.
    fn track_points(&self) -> Result<Vec<TrackPoint>, StoreError>;

    /// Delete every grid cell. Returns the number removed.
    fn clear_grid_cells(&self) -> Result<usize, StoreError>;

    /// Insert or overwrite grid cells by grid id, atomically.
    fn write_grid_cells(&self, cells: &[GridCell]) -> Result<(), StoreError>;

    /// Grid cells with `visit_count > 0`, ordered by visit count descending.
    fn eligible_grid_cells(&self) -> Result<Vec<GridCell>, StoreError>;

    /// Delete every density zone. Returns the number removed.
    fn clear_zones(&self) -> Result<usize, StoreError>;

    /// Insert or overwrite zones keyed by (bucket type, grid id), atomically.
    fn write_zones(&self, zones: &[DensityZone]) -> Result<(), StoreError>;

    /// All stored zones, ordered by bucket type then grid id.
    fn zones(&self) -> Result<Vec<DensityZone>, StoreError>;
}

/// In-process store backed by ordered maps.
#[derive(Debug)]
pub struct MemoryStore {
    zone_table: String,
    points: RwLock<Vec<TrackPoint>>,
    cells: RwLock<BTreeMap<String, GridCell>>,
    zones: RwLock<BTreeMap<(String, String), DensityZone>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_ZONE_TABLE)
    }
}

impl MemoryStore {
    pub fn new(zone_table: &str) -> Self {
        Self {
            zone_table: zone_table.to_string(),
            points: RwLock::new(Vec::new()),
            cells: RwLock::new(BTreeMap::new()),
            zones: RwLock::new(BTreeMap::new()),
        }
    }

    /// Append track points (kept sorted by timestamp).
    pub fn insert_points(&self, points: impl IntoIterator<Item = TrackPoint>) -> Result<(), StoreError> {
        let mut guard = write_lock(&self.points)?;
        guard.extend(points);
        guard.sort_by_key(|p| p.timestamp);
        Ok(())
    }

    /// Seed grid cells directly, as an external aggregation process would.
    pub fn insert_grid_cells(&self, cells: impl IntoIterator<Item = GridCell>) -> Result<(), StoreError> {
        let mut guard = write_lock(&self.cells)?;
        for cell in cells {
            guard.insert(cell.grid_id.clone(), cell);
        }
        Ok(())
    }

    /// All stored grid cells ordered by grid id.
    pub fn grid_cells(&self) -> Result<Vec<GridCell>, StoreError> {
        Ok(read_lock(&self.cells)?.values().cloned().collect())
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read().map_err(|e| StoreError::Query { message: e.to_string() })
}

fn write_lock<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write().map_err(|e| StoreError::Write { message: e.to_string() })
}

impl SpatialStore for MemoryStore {
    fn zone_table(&self) -> &str {
        &self.zone_table
    }

    fn track_points(&self) -> Result<Vec<TrackPoint>, StoreError> {
        Ok(read_lock(&self.points)?.clone())
    }

    fn clear_grid_cells(&self) -> Result<usize, StoreError> {
        let mut guard = write_lock(&self.cells)?;
        let removed = guard.len();
        guard.clear();
        Ok(removed)
    }

    fn write_grid_cells(&self, cells: &[GridCell]) -> Result<(), StoreError> {
        self.insert_grid_cells(cells.iter().cloned())
    }

    fn eligible_grid_cells(&self) -> Result<Vec<GridCell>, StoreError> {
        let mut cells: Vec<GridCell> = read_lock(&self.cells)?
            .values()
            .filter(|c| c.visit_count > 0)
            .cloned()
            .collect();
        cells.sort_by(|a, b| b.visit_count.cmp(&a.visit_count));
        Ok(cells)
    }

    fn clear_zones(&self) -> Result<usize, StoreError> {
        let mut guard = write_lock(&self.zones)?;
        let removed = guard.len();
        guard.clear();
        Ok(removed)
    }

    fn write_zones(&self, zones: &[DensityZone]) -> Result<(), StoreError> {
        let mut guard = write_lock(&self.zones)?;
        for zone in zones {
            guard.insert((zone.bucket_type.clone(), zone.grid_id.clone()), zone.clone());
        }
        Ok(())
    }

    fn zones(&self) -> Result<Vec<DensityZone>, StoreError> {
        Ok(read_lock(&self.zones)?.values().cloned().collect())
    }
}
