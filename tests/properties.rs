//! Property tests for geodesy, the geohash codec and zone classification.

use std::collections::{HashMap, HashSet};

use footprint_spatial::{
    classify_cells, geodesy, geohash, GpsPoint, GridCell, TileId, ZoneType,
};
use proptest::collection::vec;
use proptest::prelude::*;

fn coordinate() -> impl Strategy<Value = GpsPoint> {
    (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| GpsPoint::new(lat, lon))
}

fn diagonal(key: &str) -> f64 {
    let b = geohash::bounds(key);
    b.height().hypot(b.width())
}

proptest! {
    #[test]
    fn encode_length_matches_precision(p in coordinate(), precision in 1i32..=12) {
        prop_assert_eq!(geohash::encode(p.latitude, p.longitude, precision).len(), precision as usize);
    }

    #[test]
    fn decode_lies_in_bounds(p in coordinate(), precision in 1i32..=12) {
        let key = geohash::encode(p.latitude, p.longitude, precision);
        let center = geohash::decode(&key);
        let bounds = geohash::bounds(&key);

        prop_assert!(bounds.contains(&center));
        prop_assert!(bounds.contains(&p));
    }

    #[test]
    fn bounds_shrink_with_precision(p in coordinate(), precision in 1i32..12) {
        let coarse = geohash::encode(p.latitude, p.longitude, precision);
        let fine = geohash::encode(p.latitude, p.longitude, precision + 1);

        prop_assert!(fine.starts_with(&coarse));
        prop_assert!(diagonal(&fine) < diagonal(&coarse));
    }

    #[test]
    fn neighbors_are_distinct_same_length(
        lat in -80.0f64..80.0,
        lon in -180.0f64..=180.0,
        precision in 2i32..=12,
    ) {
        let key = geohash::encode(lat, lon, precision);
        let around = geohash::neighbors(&key);

        prop_assert_eq!(around.len(), 8);
        prop_assert!(around.iter().all(|k| k.len() == key.len()));
        prop_assert!(!around.contains(&key));
        let unique: HashSet<&String> = around.iter().collect();
        prop_assert_eq!(unique.len(), 8);
    }

    #[test]
    fn distance_non_negative_and_zero_on_self(a in coordinate(), b in coordinate()) {
        prop_assert!(geodesy::distance(&a, &b) >= 0.0);
        prop_assert_eq!(geodesy::distance(&a, &a), 0.0);
    }

    #[test]
    fn distance_symmetric(a in coordinate(), b in coordinate()) {
        let ab = geodesy::distance(&a, &b);
        let ba = geodesy::distance(&b, &a);
        prop_assert!((ab - ba).abs() <= 1e-6);
    }

    #[test]
    fn bearing_in_range(a in coordinate(), b in coordinate()) {
        let deg = geodesy::bearing(&a, &b);
        prop_assert!((0.0..360.0).contains(&deg), "bearing {}", deg);
    }

    #[test]
    fn destination_round_trip(
        lat in -85.0f64..85.0,
        lon in -180.0f64..=180.0,
        bearing in 0.0f64..360.0,
        d in 0.0f64..19_000_000.0,
    ) {
        let origin = GpsPoint::new(lat, lon);
        let dest = geodesy::destination(&origin, bearing, d);
        let back = geodesy::distance(&origin, &dest);
        prop_assert!((back - d).abs() <= 0.01 + d * 1e-9, "{} vs {}", back, d);
    }

    #[test]
    fn midpoint_is_equidistant(a in coordinate(), b in coordinate()) {
        prop_assume!(geodesy::distance(&a, &b) < geodesy::HALF_CIRCUMFERENCE_METERS * 0.99);
        let m = geodesy::midpoint(&a, &b);
        let da = geodesy::distance(&a, &m);
        let db = geodesy::distance(&b, &m);
        prop_assert!((da - db).abs() <= 0.01 + da * 1e-9, "{} vs {}", da, db);
    }

    #[test]
    fn classification_ignores_input_order(
        visits in vec(1u64..200, 1..60).prop_flat_map(|v| {
            let n = v.len();
            (Just(v), Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
        })
    ) {
        let (counts, order) = visits;
        let cells: Vec<GridCell> = counts
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let mut cell = GridCell::new(TileId { level: 12, x: i as u32, y: 7 });
                cell.visit_count = count;
                cell
            })
            .collect();
        let shuffled: Vec<GridCell> = order.iter().map(|&i| cells[i].clone()).collect();

        let by_id = |cells: &[GridCell]| -> HashMap<String, (ZoneType, f64)> {
            classify_cells(cells, "all", "v1")
                .into_iter()
                .map(|z| (z.grid_id, (z.zone_type, z.density_score)))
                .collect()
        };

        let first = by_id(&cells);
        prop_assert_eq!(&first, &by_id(&shuffled));
        prop_assert!(first.values().all(|(_, score)| (0.0..=1.0).contains(score)));
        prop_assert!(first.values().any(|(tier, _)| *tier == ZoneType::Hot));
    }
}

#[test]
fn geohash_round_trip_literal() {
    let key = geohash::encode(37.8324, 112.5503, 5);
    assert_eq!(key, "ww8p1");

    let center = geohash::bounds(&key).center();
    assert_eq!(geohash::encode(center.latitude, center.longitude, 5), key);
}

#[test]
fn three_cell_boundary_scenario() {
    let cells: Vec<GridCell> = [10u64, 5, 1]
        .iter()
        .enumerate()
        .map(|(i, &visits)| {
            let mut cell = GridCell::new(TileId { level: 15, x: i as u32, y: 0 });
            cell.visit_count = visits;
            cell
        })
        .collect();

    let zones = classify_cells(&cells, "all", "v1");
    let tiers: Vec<ZoneType> = zones.iter().map(|z| z.zone_type).collect();
    let scores: Vec<f64> = zones.iter().map(|z| z.density_score).collect();

    assert_eq!(tiers, vec![ZoneType::Hot, ZoneType::Cold, ZoneType::Cold]);
    assert_eq!(scores, vec![1.0, 0.5, 0.1]);
}
