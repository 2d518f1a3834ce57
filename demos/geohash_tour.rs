//! Tour of the geodesy, heading and geohash helpers.
//!
//! Run with: cargo run --example geohash_tour

use footprint_spatial::{circular, geodesy, geohash, GpsPoint};

fn main() {
    env_logger::init();

    let home = GpsPoint::new(37.8324, 112.5503); // Taiyuan
    let beijing = GpsPoint::new(39.9042, 116.4074);

    println!("Geodesy\n");
    println!("   Distance: {:.1} km", geodesy::distance_km(&home, &beijing));
    println!("   Bearing:  {:.1} deg", geodesy::bearing(&home, &beijing));
    let mid = geodesy::midpoint(&home, &beijing);
    println!("   Midpoint: ({:.4}, {:.4})", mid.latitude, mid.longitude);
    let there = geodesy::destination(&home, 45.0, 10_000.0);
    println!("   10 km north-east: ({:.4}, {:.4})\n", there.latitude, there.longitude);

    println!("Headings\n");
    let stops = [(37.8700, 112.5600), (37.8150, 112.5800), (37.8500, 112.5200)];
    let headings: Vec<f64> = stops
        .iter()
        .map(|&(lat, lng)| geodesy::bearing(&home, &GpsPoint::new(lat, lng)))
        .collect();
    let angles: Vec<f64> = headings.iter().map(|h| h.to_radians()).collect();
    println!("   Bearings: {:?}", headings.iter().map(|h| h.round()).collect::<Vec<_>>());
    println!("   Mean:     {:.1} deg", circular::circular_mean_degrees(&headings, None));
    println!("   R:        {:.3}", circular::mean_resultant_length(&angles, None));
    println!("   Uniform:  {}\n", circular::is_circular_uniform(&angles));

    println!("Geohash\n");
    for precision in [3, 5, 7, 9] {
        let key = geohash::encode(home.latitude, home.longitude, precision);
        println!(
            "   p={} {:<10} cell ~{} m",
            precision,
            key,
            geohash::cell_size_meters(precision)
        );
    }

    let key = geohash::encode(home.latitude, home.longitude, 6);
    let b = geohash::bounds(&key);
    println!(
        "\n   {} spans lat [{:.5}, {:.5}] lng [{:.5}, {:.5}]",
        key, b.min_lat, b.max_lat, b.min_lng, b.max_lng
    );
    println!("   Neighbors: {}", geohash::neighbors(&key).join(" "));

    for meters in [5_000.0, 150.0, 1.0] {
        println!(
            "   Precision for {} m: {}",
            meters,
            geohash::precision_for_distance(meters)
        );
    }
}
