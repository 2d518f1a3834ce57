//! # SQLite Store
//!
//! [`SpatialStore`] implementation on a single SQLite database.
//!
//! ## Tables
//!
//! | Table | Contents |
//! |-------|----------|
//! | `track_points` | Raw GPS samples with visit metadata |
//! | `grid_cells` | Aggregated cells, keyed by `L{level}_{x}_{y}` |
//! | zone table (default `spatial_density_grid_stats`) | Density zones keyed by `(bucket_type, grid_id)` |
//!
//! Batch writes run inside one transaction each. Dropping an uncommitted
//! transaction rolls it back, so a failed insert leaves nothing behind.
//!
//! Run locks are keyed on the database location plus the zone table. File
//! databases use their canonical path; every `:memory:` connection gets its
//! own key because each one is a separate database.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use rusqlite::{params, Connection, Row};

use crate::store::{DEFAULT_ZONE_TABLE, SpatialStore, StoreError};
use crate::{Bounds, DensityZone, GpsPoint, GridCell, TrackPoint, ZoneType};

static NEXT_MEMORY_DB: AtomicU64 = AtomicU64::new(1);

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    zone_table: String,
    lock_key: String,
}

impl SqliteStore {
    /// Open (or create) a database at `db_path` using the default zone table.
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        Self::open_with_table(db_path, DEFAULT_ZONE_TABLE)
    }

    /// Open (or create) a database with a custom zone table name.
    ///
    /// The name is interpolated into SQL, so only ASCII letters, digits and
    /// underscores are accepted.
    pub fn open_with_table(db_path: &str, zone_table: &str) -> Result<Self, StoreError> {
        if zone_table.is_empty()
            || !zone_table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::Query {
                message: format!("invalid zone table name: {:?}", zone_table),
            });
        }

        let conn = Connection::open(db_path)?;
        init_schema(&conn, zone_table)?;
        info!("[SqliteStore] Opened {} (zone table {})", db_path, zone_table);

        Ok(Self {
            conn: Mutex::new(conn),
            zone_table: zone_table.to_string(),
            lock_key: format!("{}#{}", database_identity(db_path), zone_table),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError::Query { message: e.to_string() })
    }

    /// Insert raw track points in one transaction.
    pub fn insert_points(&self, points: &[TrackPoint]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO track_points (
                    timestamp, latitude, longitude, speed_kmh, mode,
                    province, city, county, outlier_flag
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for p in points {
                stmt.execute(params![
                    p.timestamp,
                    p.latitude,
                    p.longitude,
                    p.speed_kmh,
                    p.mode,
                    p.province,
                    p.city,
                    p.county,
                    p.outlier,
                ])?;
            }
        }
        tx.commit()?;
        debug!("[SqliteStore] Inserted {} track points", points.len());
        Ok(())
    }

    fn query_cells(&self, where_clause: &str) -> Result<Vec<GridCell>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT grid_id, level, x, y, center_lat, center_lon,
                    min_lat, max_lat, min_lon, max_lon,
                    point_count, visit_count, total_duration_s, first_visit, last_visit,
                    province, city, county, avg_speed_kmh, max_speed_kmh, dominant_mode
             FROM grid_cells {}",
            where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let cells = stmt
            .query_map([], row_to_cell)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cells)
    }
}

fn database_identity(db_path: &str) -> String {
    if db_path.is_empty() || db_path == ":memory:" {
        return format!(":memory:{}", NEXT_MEMORY_DB.fetch_add(1, Ordering::Relaxed));
    }
    std::fs::canonicalize(db_path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| db_path.to_string())
}

fn init_schema(conn: &Connection, zone_table: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS track_points (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            speed_kmh REAL,
            mode TEXT,
            province TEXT,
            city TEXT,
            county TEXT,
            outlier_flag INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_track_points_time ON track_points(timestamp);

        CREATE TABLE IF NOT EXISTS grid_cells (
            grid_id TEXT PRIMARY KEY,
            level INTEGER NOT NULL,
            x INTEGER NOT NULL,
            y INTEGER NOT NULL,
            center_lat REAL NOT NULL,
            center_lon REAL NOT NULL,
            min_lat REAL NOT NULL,
            max_lat REAL NOT NULL,
            min_lon REAL NOT NULL,
            max_lon REAL NOT NULL,
            point_count INTEGER NOT NULL DEFAULT 0,
            visit_count INTEGER NOT NULL DEFAULT 0,
            total_duration_s INTEGER NOT NULL DEFAULT 0,
            first_visit INTEGER,
            last_visit INTEGER,
            province TEXT,
            city TEXT,
            county TEXT,
            avg_speed_kmh REAL,
            max_speed_kmh REAL,
            dominant_mode TEXT,
            updated_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_grid_cells_visits ON grid_cells(visit_count);

        CREATE TABLE IF NOT EXISTS {table} (
            bucket_type TEXT NOT NULL,
            grid_id TEXT NOT NULL,
            level INTEGER NOT NULL,
            center_lat REAL NOT NULL,
            center_lon REAL NOT NULL,
            province TEXT,
            city TEXT,
            county TEXT,
            density_score REAL NOT NULL,
            zone_type TEXT NOT NULL,
            point_count INTEGER NOT NULL,
            visit_count INTEGER NOT NULL,
            total_duration_s INTEGER NOT NULL,
            algo_version TEXT NOT NULL,
            updated_at INTEGER,
            PRIMARY KEY (bucket_type, grid_id)
        );
        "#,
        table = zone_table
    ))?;
    Ok(())
}

fn row_to_cell(row: &Row<'_>) -> rusqlite::Result<GridCell> {
    Ok(GridCell {
        grid_id: row.get(0)?,
        level: row.get(1)?,
        x: row.get(2)?,
        y: row.get(3)?,
        center: GpsPoint::new(row.get(4)?, row.get(5)?),
        bounds: Bounds {
            min_lat: row.get(6)?,
            max_lat: row.get(7)?,
            min_lng: row.get(8)?,
            max_lng: row.get(9)?,
        },
        point_count: row.get::<_, i64>(10)? as u64,
        visit_count: row.get::<_, i64>(11)? as u64,
        total_duration_seconds: row.get(12)?,
        first_visit: row.get(13)?,
        last_visit: row.get(14)?,
        province: row.get(15)?,
        city: row.get(16)?,
        county: row.get(17)?,
        avg_speed_kmh: row.get(18)?,
        max_speed_kmh: row.get(19)?,
        dominant_mode: row.get(20)?,
    })
}

fn row_to_zone(row: &Row<'_>) -> rusqlite::Result<DensityZone> {
    let zone_type: String = row.get(9)?;
    let zone_type = ZoneType::parse(&zone_type).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(9, "zone_type".to_string(), rusqlite::types::Type::Text)
    })?;

    Ok(DensityZone {
        bucket_type: row.get(0)?,
        grid_id: row.get(1)?,
        level: row.get(2)?,
        center: GpsPoint::new(row.get(3)?, row.get(4)?),
        province: row.get(5)?,
        city: row.get(6)?,
        county: row.get(7)?,
        density_score: row.get(8)?,
        zone_type,
        point_count: row.get::<_, i64>(10)? as u64,
        visit_count: row.get::<_, i64>(11)? as u64,
        total_duration_seconds: row.get(12)?,
        algo_version: row.get(13)?,
    })
}

impl SpatialStore for SqliteStore {
    fn zone_table(&self) -> &str {
        &self.zone_table
    }

    fn lock_key(&self) -> String {
        self.lock_key.clone()
    }

    fn track_points(&self) -> Result<Vec<TrackPoint>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, latitude, longitude, speed_kmh, mode,
                    province, city, county, outlier_flag
             FROM track_points
             ORDER BY timestamp, id",
        )?;
        let points = stmt
            .query_map([], |row| {
                Ok(TrackPoint {
                    timestamp: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    speed_kmh: row.get(3)?,
                    mode: row.get(4)?,
                    province: row.get(5)?,
                    city: row.get(6)?,
                    county: row.get(7)?,
                    outlier: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    fn clear_grid_cells(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM grid_cells", [])?)
    }

    fn write_grid_cells(&self, cells: &[GridCell]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO grid_cells (
                    grid_id, level, x, y, center_lat, center_lon,
                    min_lat, max_lat, min_lon, max_lon,
                    point_count, visit_count, total_duration_s, first_visit, last_visit,
                    province, city, county, avg_speed_kmh, max_speed_kmh, dominant_mode,
                    updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                          CAST(strftime('%s', 'now') AS INTEGER))
                ON CONFLICT(grid_id) DO UPDATE SET
                    level = excluded.level,
                    x = excluded.x,
                    y = excluded.y,
                    center_lat = excluded.center_lat,
                    center_lon = excluded.center_lon,
                    min_lat = excluded.min_lat,
                    max_lat = excluded.max_lat,
                    min_lon = excluded.min_lon,
                    max_lon = excluded.max_lon,
                    point_count = excluded.point_count,
                    visit_count = excluded.visit_count,
                    total_duration_s = excluded.total_duration_s,
                    first_visit = excluded.first_visit,
                    last_visit = excluded.last_visit,
                    province = excluded.province,
                    city = excluded.city,
                    county = excluded.county,
                    avg_speed_kmh = excluded.avg_speed_kmh,
                    max_speed_kmh = excluded.max_speed_kmh,
                    dominant_mode = excluded.dominant_mode,
                    updated_at = excluded.updated_at",
            )?;
            for c in cells {
                stmt.execute(params![
                    c.grid_id,
                    c.level,
                    c.x,
                    c.y,
                    c.center.latitude,
                    c.center.longitude,
                    c.bounds.min_lat,
                    c.bounds.max_lat,
                    c.bounds.min_lng,
                    c.bounds.max_lng,
                    c.point_count as i64,
                    c.visit_count as i64,
                    c.total_duration_seconds,
                    c.first_visit,
                    c.last_visit,
                    c.province,
                    c.city,
                    c.county,
                    c.avg_speed_kmh,
                    c.max_speed_kmh,
                    c.dominant_mode,
                ])?;
            }
        }
        tx.commit()?;
        debug!("[SqliteStore] Upserted {} grid cells", cells.len());
        Ok(())
    }

    fn eligible_grid_cells(&self) -> Result<Vec<GridCell>, StoreError> {
        self.query_cells("WHERE visit_count > 0 ORDER BY visit_count DESC, grid_id")
    }

    fn clear_zones(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        Ok(conn.execute(&format!("DELETE FROM {}", self.zone_table), [])?)
    }

    fn write_zones(&self, zones: &[DensityZone]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (
                    bucket_type, grid_id, level, center_lat, center_lon,
                    province, city, county, density_score, zone_type,
                    point_count, visit_count, total_duration_s, algo_version, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                          CAST(strftime('%s', 'now') AS INTEGER))
                ON CONFLICT(bucket_type, grid_id) DO UPDATE SET
                    level = excluded.level,
                    center_lat = excluded.center_lat,
                    center_lon = excluded.center_lon,
                    province = excluded.province,
                    city = excluded.city,
                    county = excluded.county,
                    density_score = excluded.density_score,
                    zone_type = excluded.zone_type,
                    point_count = excluded.point_count,
                    visit_count = excluded.visit_count,
                    total_duration_s = excluded.total_duration_s,
                    algo_version = excluded.algo_version,
                    updated_at = excluded.updated_at",
                self.zone_table
            ))?;
            for z in zones {
                stmt.execute(params![
                    z.bucket_type,
                    z.grid_id,
                    z.level,
                    z.center.latitude,
                    z.center.longitude,
                    z.province,
                    z.city,
                    z.county,
                    z.density_score,
                    z.zone_type.as_str(),
                    z.point_count as i64,
                    z.visit_count as i64,
                    z.total_duration_seconds,
                    z.algo_version,
                ])?;
            }
        }
        tx.commit()?;
        info!("[SqliteStore] Inserted {} density zones", zones.len());
        Ok(())
    }

    fn zones(&self) -> Result<Vec<DensityZone>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT bucket_type, grid_id, level, center_lat, center_lon,
                    province, city, county, density_score, zone_type,
                    point_count, visit_count, total_duration_s, algo_version
             FROM {}
             ORDER BY bucket_type, grid_id",
            self.zone_table
        ))?;
        let zones = stmt
            .query_map([], row_to_zone)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(zones)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        aggregate_points, classify_cells, CancellationToken, DensityClassifier, GridConfig,
        RunLocks, RunMode, TileId,
    };

    fn sample_points() -> Vec<TrackPoint> {
        let mut points = Vec::new();
        for i in 0..5 {
            let mut p = TrackPoint::new(i * 60, 37.8324, 112.5503);
            p.city = Some("Taiyuan".into());
            p.speed_kmh = Some(3.5);
            points.push(p);
        }
        points.push(TrackPoint::new(400, 37.8700, 112.5600));
        points
    }

    #[test]
    fn test_rejects_bad_table_name() {
        assert!(SqliteStore::open_with_table(":memory:", "zones; DROP TABLE x").is_err());
        assert!(SqliteStore::open_with_table(":memory:", "").is_err());
    }

    #[test]
    fn test_points_round_trip_in_time_order() {
        let store = SqliteStore::in_memory().unwrap();
        let mut points = sample_points();
        points.reverse();
        store.insert_points(&points).unwrap();

        let loaded = store.track_points().unwrap();
        assert_eq!(loaded.len(), 6);
        assert_eq!(loaded[0].timestamp, 0);
        assert_eq!(loaded[0].city.as_deref(), Some("Taiyuan"));
        assert_eq!(loaded[5].timestamp, 400);
    }

    #[test]
    fn test_grid_cells_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let config = GridConfig { levels: vec![15], ..GridConfig::default() };
        let cells = aggregate_points(&sample_points(), &config);
        store.write_grid_cells(&cells).unwrap();

        let eligible = store.eligible_grid_cells().unwrap();
        assert_eq!(eligible.len(), 2);
        assert!(cells.contains(&eligible[0]));
        assert!(cells.contains(&eligible[1]));

        // Upsert overwrites rather than duplicating.
        store.write_grid_cells(&cells).unwrap();
        assert_eq!(store.eligible_grid_cells().unwrap().len(), 2);
        assert_eq!(store.clear_grid_cells().unwrap(), 2);
    }

    #[test]
    fn test_zones_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let config = GridConfig { levels: vec![15], ..GridConfig::default() };
        let cells = aggregate_points(&sample_points(), &config);
        let zones = classify_cells(&cells, "all", "v1");
        store.write_zones(&zones).unwrap();

        let mut expected = zones.clone();
        expected.sort_by(|a, b| a.grid_id.cmp(&b.grid_id));
        assert_eq!(store.zones().unwrap(), expected);

        assert_eq!(store.clear_zones().unwrap(), 2);
        assert!(store.zones().unwrap().is_empty());
    }

    fn cell(x: u32, visits: u64) -> GridCell {
        let mut c = GridCell::new(TileId { level: 15, x, y: 12658 });
        c.visit_count = visits;
        c
    }

    #[test]
    fn test_zone_upsert_replaces_labels() {
        let store = SqliteStore::in_memory().unwrap();
        let first = classify_cells(&[cell(1, 4)], "all", "v1");
        assert_eq!(first[0].city, None);
        store.write_zones(&first).unwrap();

        let mut relabeled = first.clone();
        relabeled[0].province = Some("Shanxi".into());
        relabeled[0].city = Some("Taiyuan".into());
        relabeled[0].county = Some("Xiaodian".into());
        relabeled[0].center = GpsPoint::new(37.8324, 112.5503);
        store.write_zones(&relabeled).unwrap();

        let zones = store.zones().unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].city.as_deref(), Some("Taiyuan"));
        assert_eq!(zones, relabeled);
    }

    #[test]
    fn test_failed_batch_keeps_previous_zones() {
        let store = Arc::new(SqliteStore::open_with_table(":memory:", "zones_rollback").unwrap());
        store
            .write_grid_cells(&[cell(1, 9), cell(2, 5), cell(3, 1)])
            .unwrap();

        // An older zone for the first cell, which the run would overwrite.
        let before = classify_cells(&[cell(1, 2), cell(2, 2)], "all", "v0");
        store.write_zones(&before).unwrap();

        // The last row of the batch is rejected after the others went in.
        store
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_zone BEFORE INSERT ON zones_rollback
                 WHEN NEW.grid_id = 'L15_3_12658'
                 BEGIN SELECT RAISE(ABORT, 'rejected zone'); END;",
            )
            .unwrap();

        let run = DensityClassifier::new(store.clone())
            .run(RunMode::Incremental, &CancellationToken::new());

        let message = run.failure_message().unwrap();
        assert!(message.contains("rejected zone"), "{}", message);
        assert_eq!(store.zones().unwrap(), before);
    }

    #[test]
    fn test_lock_key_tells_databases_apart() {
        let a = SqliteStore::in_memory().unwrap();
        let b = SqliteStore::in_memory().unwrap();
        assert_eq!(a.zone_table(), b.zone_table());
        assert_ne!(a.lock_key(), b.lock_key());

        let path = std::env::temp_dir().join(format!("footprint_lock_{}.db", std::process::id()));
        let path = path.to_string_lossy().into_owned();
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();
        let other_table = SqliteStore::open_with_table(&path, "zones_other").unwrap();
        assert_eq!(first.lock_key(), second.lock_key());
        assert_ne!(first.lock_key(), other_table.lock_key());
        drop((first, second, other_table));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_runs_on_separate_databases_do_not_block() {
        let busy = SqliteStore::in_memory().unwrap();
        let idle = Arc::new(SqliteStore::in_memory().unwrap());
        idle.write_grid_cells(&[cell(1, 3)]).unwrap();

        let _guard = RunLocks::global().try_acquire(&busy.lock_key()).unwrap();
        let run = DensityClassifier::new(idle.clone()).run(RunMode::Full, &CancellationToken::new());

        assert!(run.is_completed(), "{:?}", run.status);
        assert_eq!(idle.zones().unwrap().len(), 1);
    }
}
