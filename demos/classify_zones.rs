//! Aggregate a week of synthetic footprints and classify density zones.
//!
//! Run with: RUST_LOG=info cargo run --example classify_zones

use std::sync::Arc;

use footprint_spatial::{
    default_registry, generate_heatmap, query_heatmap_cell, CancellationToken, GpsPoint,
    HeatmapConfig, MemoryStore, RunMode, SpatialStore, TrackPoint, ZoneIndex,
};

const PLACES: [(&str, f64, f64); 4] = [
    ("home", 37.8324, 112.5503),
    ("office", 37.8700, 112.5600),
    ("gym", 37.8500, 112.5300),
    ("market", 37.8150, 112.5800),
];

fn synthetic_week() -> Vec<TrackPoint> {
    let mut points = Vec::new();
    for day in 0..7i64 {
        let base = day * 86_400;
        // (place index, start offset, samples)
        let schedule: &[(usize, i64, i64)] = match day % 7 {
            5 | 6 => &[(0, 0, 20), (3, 40_000, 6), (0, 50_000, 20)],
            d if d % 2 == 0 => &[(0, 0, 12), (1, 30_000, 16), (2, 64_000, 4), (0, 72_000, 10)],
            _ => &[(0, 0, 12), (1, 30_000, 16), (0, 70_000, 12)],
        };

        for &(place, start, samples) in schedule {
            let (_, lat, lng) = PLACES[place];
            for i in 0..samples {
                let mut p = TrackPoint::new(base + start + i * 300, lat, lng);
                p.mode = Some(if place == 0 { "stay" } else { "walk" }.to_string());
                p.city = Some("Taiyuan".to_string());
                points.push(p);
            }
        }
    }
    points
}

fn main() {
    env_logger::init();

    let store = Arc::new(MemoryStore::default());
    if let Err(e) = store.insert_points(synthetic_week()) {
        eprintln!("Failed to load points: {}", e);
        return;
    }

    let registry = default_registry();
    let cancel = CancellationToken::new();
    let shared: Arc<dyn SpatialStore> = store.clone();

    println!("Analyzers: {}\n", registry.skills().join(", "));
    for skill in ["grid_system", "density_structure"] {
        let analyzer = match registry.build(skill, shared.clone()) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("{}", e);
                return;
            }
        };
        let run = analyzer.analyze(RunMode::Full, &cancel);
        match run.summary() {
            Some(summary) => println!("{} run {}: {}", skill, run.id, summary),
            None => println!("{} run {} failed: {:?}", skill, run.id, run.failure_message()),
        }
    }

    let (cells, zones) = match (store.grid_cells(), store.zones()) {
        (Ok(c), Ok(z)) => (c, z),
        _ => {
            eprintln!("Failed to read results");
            return;
        }
    };

    let mut heatmap = generate_heatmap(&cells, &HeatmapConfig::default());
    heatmap.overlay_zones(&zones);
    println!(
        "\nHeatmap level {}: {} cells over {}x{} tiles, busiest {} visits",
        heatmap.level,
        heatmap.cells.len(),
        heatmap.grid_cols,
        heatmap.grid_rows,
        heatmap.max_visit_count
    );

    for (name, lat, lng) in PLACES {
        if let Some(hit) = query_heatmap_cell(&heatmap, lat, lng) {
            println!("   {:<7} {} -> {}", name, hit.cell.grid_id, hit.suggested_label);
        }
    }

    let index = ZoneIndex::new(zones);
    let home = GpsPoint::new(PLACES[0].1, PLACES[0].2);
    println!("\nZones within 3 km of home:");
    for (zone, meters) in index.within_radius(&home, 3_000.0) {
        println!(
            "   {:<18} {:<5} score {:.2} at {:.0} m",
            zone.grid_id,
            zone.zone_type.as_str(),
            zone.density_score,
            meters
        );
    }
}
