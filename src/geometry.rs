//! # Point-Set Geometry
//!
//! Descriptive geometry over sets and sequences of GPS points: centers,
//! dispersion, path shape and simple polygon tests.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`centroid`] / [`weighted_centroid`] | Mean position of a point set |
//! | [`radius_of_gyration`] / [`weighted_radius_of_gyration`] | RMS distance to the centroid |
//! | [`bounding_box`] / [`bounding_box_area`] | Enclosing box and its area in m² |
//! | [`polygon_area`] / [`convex_hull_area`] | Geodesic area of a ring or of a point set's hull |
//! | [`path_length`] / [`tortuosity`] | Length and winding of a track |
//! | [`point_in_polygon`] | Containment against a lat/lon ring |
//! | [`simplify_path`] | Douglas-Peucker with a tolerance in meters |
//! | [`meters_to_degrees`] / [`bounds_overlap`] | Quick degree-space filtering |
//!
//! Centroids are plain coordinate means, which is accurate for the city-scale
//! point sets this crate handles but drifts for sets spanning the antimeridian.

use geo::{
    algorithm::simplify::Simplify, Contains, ConvexHull, Coord, GeodesicArea, LineString,
    MultiPoint, Point, Polygon,
};

use crate::geodesy::distance;
use crate::{Bounds, GpsPoint};

// =============================================================================
// Centers
// =============================================================================

/// Arithmetic mean of the points. Returns (0, 0) for empty input.
pub fn centroid(points: &[GpsPoint]) -> GpsPoint {
    if points.is_empty() {
        return GpsPoint::new(0.0, 0.0);
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    GpsPoint::new(sum_lat / n, sum_lng / n)
}

/// Weighted mean of the points.
///
/// Points without a matching weight count with weight 1. A zero total weight
/// falls back to [`centroid`].
pub fn weighted_centroid(points: &[GpsPoint], weights: &[f64]) -> GpsPoint {
    if points.is_empty() {
        return GpsPoint::new(0.0, 0.0);
    }

    let mut sum_lat = 0.0;
    let mut sum_lng = 0.0;
    let mut sum_w = 0.0;
    for (i, p) in points.iter().enumerate() {
        let w = weight_at(weights, i);
        sum_lat += p.latitude * w;
        sum_lng += p.longitude * w;
        sum_w += w;
    }

    if sum_w == 0.0 {
        return centroid(points);
    }

    GpsPoint::new(sum_lat / sum_w, sum_lng / sum_w)
}

// =============================================================================
// Dispersion
// =============================================================================

/// Radius of gyration in meters: RMS great-circle distance to the centroid.
pub fn radius_of_gyration(points: &[GpsPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }

    let center = centroid(points);
    let sum_sq: f64 = points
        .iter()
        .map(|p| distance(&center, p).powi(2))
        .sum();

    (sum_sq / points.len() as f64).sqrt()
}

/// Weighted radius of gyration in meters, around the weighted centroid.
pub fn weighted_radius_of_gyration(points: &[GpsPoint], weights: &[f64]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }

    let center = weighted_centroid(points, weights);
    let mut sum_sq = 0.0;
    let mut sum_w = 0.0;
    for (i, p) in points.iter().enumerate() {
        let w = weight_at(weights, i);
        sum_sq += w * distance(&center, p).powi(2);
        sum_w += w;
    }

    if sum_w == 0.0 {
        return radius_of_gyration(points);
    }

    (sum_sq / sum_w).sqrt()
}

#[inline]
fn weight_at(weights: &[f64], i: usize) -> f64 {
    weights.get(i).copied().unwrap_or(1.0)
}

// =============================================================================
// Boxes
// =============================================================================

/// Bounding box of the points, `None` for empty input.
#[inline]
pub fn bounding_box(points: &[GpsPoint]) -> Option<Bounds> {
    Bounds::from_points(points)
}

/// Approximate area of a bounding box in square meters.
///
/// Width is measured along the southern edge, height along the western edge.
pub fn bounding_box_area(bounds: &Bounds) -> f64 {
    let south_west = GpsPoint::new(bounds.min_lat, bounds.min_lng);
    let south_east = GpsPoint::new(bounds.min_lat, bounds.max_lng);
    let north_west = GpsPoint::new(bounds.max_lat, bounds.min_lng);

    distance(&south_west, &south_east) * distance(&south_west, &north_west)
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Uses the longitude scale at `latitude`, which is the larger of the two
/// degree counts, so a square search box built from it never undershoots.
/// The cosine is floored at 0.1 to stay usable near the poles.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let meters_per_degree = 111_320.0 * latitude.to_radians().cos().max(0.1);
    meters / meters_per_degree
}

/// Check if two bounding boxes overlap, expanded by `buffer_meters`.
pub fn bounds_overlap(a: &Bounds, b: &Bounds, buffer_meters: f64, reference_lat: f64) -> bool {
    let buffer_deg = meters_to_degrees(buffer_meters, reference_lat);

    !(a.max_lat + buffer_deg < b.min_lat
        || b.max_lat + buffer_deg < a.min_lat
        || a.max_lng + buffer_deg < b.min_lng
        || b.max_lng + buffer_deg < a.min_lng)
}

// =============================================================================
// Paths
// =============================================================================

/// Total length of a track in meters. Fewer than two points gives 0.
pub fn path_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| distance(&w[0], &w[1]))
        .sum()
}

/// Path length divided by the straight-line distance between the endpoints.
///
/// 1.0 is a straight line. Degenerate tracks (fewer than two points, or a loop
/// that ends where it started) report 1.0.
pub fn tortuosity(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 1.0;
    }

    let straight = distance(&points[0], &points[points.len() - 1]);
    if straight == 0.0 {
        return 1.0;
    }

    path_length(points) / straight
}

/// Douglas-Peucker simplification with a tolerance in meters.
///
/// The tolerance is converted to degrees at the first point's latitude.
/// Tracks with fewer than three points are returned unchanged.
pub fn simplify_path(points: &[GpsPoint], epsilon_meters: f64) -> Vec<GpsPoint> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let line: LineString<f64> = points
        .iter()
        .map(|p| Coord { x: p.longitude, y: p.latitude })
        .collect();

    let epsilon = meters_to_degrees(epsilon_meters, points[0].latitude);
    line.simplify(&epsilon)
        .0
        .into_iter()
        .map(|c| GpsPoint::new(c.y, c.x))
        .collect()
}

// =============================================================================
// Areas
// =============================================================================

/// Area in m² enclosed by the ring `polygon`, on the WGS84 ellipsoid.
///
/// Winding does not matter and the ring does not need to be closed. Fewer
/// than three vertices encloses nothing.
pub fn polygon_area(polygon: &[GpsPoint]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let ring: LineString<f64> = polygon.iter().map(to_coord).collect();
    Polygon::new(ring, vec![]).geodesic_area_signed().abs()
}

/// Area in m² of the convex hull around `points`.
pub fn convex_hull_area(points: &[GpsPoint]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let cloud: MultiPoint<f64> = points.iter().map(|p| Point::<f64>::from(*p)).collect();
    cloud.convex_hull().geodesic_area_signed().abs()
}

fn to_coord(p: &GpsPoint) -> Coord<f64> {
    Coord { x: p.longitude, y: p.latitude }
}

/// Whether `point` lies strictly inside the ring `polygon`.
///
/// The ring does not need to be closed. Fewer than three vertices is never a
/// polygon and always returns `false`.
pub fn point_in_polygon(point: &GpsPoint, polygon: &[GpsPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let ring: LineString<f64> = polygon.iter().map(to_coord).collect();
    Polygon::new(ring, vec![]).contains(&Point::<f64>::from(*point))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_centroid() {
        let pts = vec![GpsPoint::new(37.80, 112.50), GpsPoint::new(37.82, 112.52)];
        let c = centroid(&pts);
        assert!(approx_eq(c.latitude, 37.81, 1e-9));
        assert!(approx_eq(c.longitude, 112.51, 1e-9));
        assert_eq!(centroid(&[]), GpsPoint::new(0.0, 0.0));
    }

    #[test]
    fn test_weighted_centroid() {
        let pts = vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(10.0, 10.0)];
        let c = weighted_centroid(&pts, &[3.0, 1.0]);
        assert!(approx_eq(c.latitude, 2.5, 1e-9));

        // Missing weights default to 1.
        let c = weighted_centroid(&pts, &[]);
        assert!(approx_eq(c.latitude, 5.0, 1e-9));

        // All-zero weights fall back to the plain mean.
        let c = weighted_centroid(&pts, &[0.0, 0.0]);
        assert!(approx_eq(c.longitude, 5.0, 1e-9));
    }

    #[test]
    fn test_radius_of_gyration() {
        assert_eq!(radius_of_gyration(&[]), 0.0);

        let single = vec![GpsPoint::new(37.8, 112.5)];
        assert_eq!(radius_of_gyration(&single), 0.0);

        let pts = vec![GpsPoint::new(0.0, -0.01), GpsPoint::new(0.0, 0.01)];
        // Each point sits ~1112 m from the center.
        assert!(approx_eq(radius_of_gyration(&pts), 1111.95, 1.0));
    }

    #[test]
    fn test_weighted_radius_pulls_toward_heavy_point() {
        let pts = vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 0.02)];
        let even = weighted_radius_of_gyration(&pts, &[1.0, 1.0]);
        let skewed = weighted_radius_of_gyration(&pts, &[9.0, 1.0]);
        assert!(skewed < even);
    }

    #[test]
    fn test_bounding_box_area() {
        let b = Bounds { min_lat: 0.0, max_lat: 1.0, min_lng: 0.0, max_lng: 1.0 };
        let expected = 111_194.93 * 111_194.93;
        assert!(((bounding_box_area(&b) - expected) / expected).abs() < 1e-6);
        assert!(bounding_box(&[]).is_none());
    }

    #[test]
    fn test_polygon_area_one_degree_square() {
        let square = [
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 1.0),
            GpsPoint::new(1.0, 1.0),
            GpsPoint::new(1.0, 0.0),
        ];
        // 110.574 km of meridian by 111.320 km of equator on WGS84.
        let expected = 1.2309e10;
        assert!(((polygon_area(&square) - expected) / expected).abs() < 1e-3);

        let mut reversed = square;
        reversed.reverse();
        assert!(approx_eq(polygon_area(&reversed), polygon_area(&square), 1.0));
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn test_convex_hull_area_ignores_interior_points() {
        let corners = [
            GpsPoint::new(37.80, 112.50),
            GpsPoint::new(37.80, 112.52),
            GpsPoint::new(37.82, 112.52),
            GpsPoint::new(37.82, 112.50),
        ];
        let mut cloud = corners.to_vec();
        cloud.push(GpsPoint::new(37.81, 112.51));
        cloud.push(GpsPoint::new(37.805, 112.515));

        let square = polygon_area(&corners);
        assert!(square > 0.0);
        assert!(approx_eq(convex_hull_area(&cloud), square, square * 1e-9));

        // Half the square once a corner is dropped.
        let triangle = convex_hull_area(&corners[..3]);
        assert!(approx_eq(triangle, square / 2.0, square * 1e-3));

        let line = [
            GpsPoint::new(37.80, 112.50),
            GpsPoint::new(37.81, 112.51),
            GpsPoint::new(37.82, 112.52),
        ];
        assert!(convex_hull_area(&line) < square * 1e-3);
        assert_eq!(convex_hull_area(&corners[..2]), 0.0);
    }

    #[test]
    fn test_path_length_and_tortuosity() {
        assert_eq!(path_length(&[]), 0.0);
        assert_eq!(tortuosity(&[GpsPoint::new(1.0, 1.0)]), 1.0);

        let straight = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.5),
            GpsPoint::new(0.0, 1.0),
        ];
        assert!(approx_eq(tortuosity(&straight), 1.0, 1e-9));

        let detour = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(1.0, 0.5),
            GpsPoint::new(0.0, 1.0),
        ];
        assert!(tortuosity(&detour) > 2.0);

        let loop_back = vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.1, 0.0), GpsPoint::new(0.0, 0.0)];
        assert_eq!(tortuosity(&loop_back), 1.0);
    }

    #[test]
    fn test_point_in_polygon() {
        let square = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 1.0),
            GpsPoint::new(1.0, 1.0),
            GpsPoint::new(1.0, 0.0),
        ];
        assert!(point_in_polygon(&GpsPoint::new(0.5, 0.5), &square));
        assert!(!point_in_polygon(&GpsPoint::new(1.5, 0.5), &square));
        assert!(!point_in_polygon(&GpsPoint::new(0.5, 0.5), &square[..2]));
    }

    #[test]
    fn test_simplify_path_drops_collinear_points() {
        let track: Vec<GpsPoint> = (0..50).map(|i| GpsPoint::new(0.0, i as f64 * 0.0001)).collect();
        let simplified = simplify_path(&track, 5.0);
        assert_eq!(simplified.len(), 2);
        assert_eq!(simplified[0], track[0]);
        assert_eq!(simplified[1], track[49]);
    }

    #[test]
    fn test_simplify_path_keeps_corners() {
        let track = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.01),
            GpsPoint::new(0.01, 0.01),
        ];
        assert_eq!(simplify_path(&track, 5.0).len(), 3);
    }

    #[test]
    fn test_bounds_overlap() {
        let a = Bounds { min_lat: 37.80, max_lat: 37.81, min_lng: 112.50, max_lng: 112.51 };
        let b = Bounds { min_lat: 37.82, max_lat: 37.83, min_lng: 112.52, max_lng: 112.53 };
        assert!(!bounds_overlap(&a, &b, 0.0, 37.8));
        assert!(bounds_overlap(&a, &b, 5_000.0, 37.8));
    }

    #[test]
    fn test_meters_to_degrees() {
        assert!(approx_eq(meters_to_degrees(111_320.0, 0.0), 1.0, 0.01));
        assert!(meters_to_degrees(111_320.0, 45.0) > 1.0);
    }
}
