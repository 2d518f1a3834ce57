//! # Geodesy
//!
//! Great-circle computations on a spherical Earth.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`distance`] | Haversine distance between two points, in meters |
//! | [`bearing`] | Initial forward azimuth, degrees in `[0, 360)` |
//! | [`destination`] | Point reached from an origin along a bearing |
//! | [`midpoint`] | Point halfway along the great-circle arc |
//!
//! All four share [`EARTH_RADIUS_METERS`], so `destination` followed by `distance`
//! returns the travelled distance up to floating-point error.
//!
//! ## Numeric Semantics
//!
//! Inputs and outputs are degrees; trigonometry runs in radians. Nothing is
//! validated: NaN or infinite inputs propagate through the arithmetic. Use
//! [`GpsPoint::is_valid`] upstream when input quality is unknown.
//!
//! ## Example
//!
//! ```rust
//! use footprint_spatial::{GpsPoint, geodesy};
//!
//! let london = GpsPoint::new(51.5074, -0.1278);
//! let paris = GpsPoint::new(48.8566, 2.3522);
//!
//! let d = geodesy::distance(&london, &paris);
//! assert!((d - 343_500.0).abs() < 1_000.0);
//!
//! let heading = geodesy::bearing(&london, &paris);
//! assert!(heading > 140.0 && heading < 160.0);
//! ```

use std::f64::consts::PI;

use crate::GpsPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Half the great-circle circumference, in meters.
pub const HALF_CIRCUMFERENCE_METERS: f64 = PI * EARTH_RADIUS_METERS;

/// Great-circle distance between two points in meters (haversine formula).
///
/// Symmetric, and exactly `0.0` for identical inputs.
///
/// # Example
///
/// ```rust
/// use footprint_spatial::{GpsPoint, geodesy};
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(0.0, 1.0);
/// assert!((geodesy::distance(&a, &b) - 111_194.9).abs() < 1.0);
/// ```
#[inline]
pub fn distance(a: &GpsPoint, b: &GpsPoint) -> f64 {
    angular_distance(a, b) * EARTH_RADIUS_METERS
}

/// Great-circle distance between two points in kilometers.
#[inline]
pub fn distance_km(a: &GpsPoint, b: &GpsPoint) -> f64 {
    angular_distance(a, b) * EARTH_RADIUS_KM
}

fn angular_distance(a: &GpsPoint, b: &GpsPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for near-antipodal pairs.
    let h = if h > 1.0 { 1.0 } else { h };

    2.0 * h.sqrt().asin()
}

/// Initial bearing from `a` to `b` in degrees, `0` = North, `90` = East.
///
/// The result always lies in `[0, 360)`. Not symmetric: the return bearing
/// generally differs from the outbound one by something other than 180°.
pub fn bearing(a: &GpsPoint, b: &GpsPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    let degrees = y.atan2(x).to_degrees();
    (degrees + 360.0) % 360.0
}

/// Point reached by travelling `distance_meters` from `origin` along `bearing_deg`.
///
/// Uses the spherical direct formula with angular distance
/// `distance_meters / EARTH_RADIUS_METERS`. The returned longitude is wrapped
/// into `[-180, 180)`.
///
/// # Example
///
/// ```rust
/// use footprint_spatial::{GpsPoint, geodesy};
///
/// let origin = GpsPoint::new(37.8324, 112.5503);
/// let there = geodesy::destination(&origin, 45.0, 10_000.0);
/// assert!((geodesy::distance(&origin, &there) - 10_000.0).abs() < 1e-6);
/// ```
pub fn destination(origin: &GpsPoint, bearing_deg: f64, distance_meters: f64) -> GpsPoint {
    let delta = distance_meters / EARTH_RADIUS_METERS;
    let theta = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let sin_lat2 = lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    GpsPoint::new(lat2.to_degrees(), wrap_longitude(lon2.to_degrees()))
}

/// Point halfway along the great-circle arc from `a` to `b`.
///
/// Computed by spherical linear interpolation of the two unit vectors at
/// `t = 0.5`, which for the midpoint reduces to normalising their sum. This
/// differs from the arithmetic mean of latitudes and longitudes except along
/// the equator or a single meridian.
///
/// Exactly antipodal inputs have infinitely many midpoints; the one due east
/// of `a` (a quarter circumference away) is returned.
pub fn midpoint(a: &GpsPoint, b: &GpsPoint) -> GpsPoint {
    let va = to_unit_vector(a);
    let vb = to_unit_vector(b);

    let sum = [va[0] + vb[0], va[1] + vb[1], va[2] + vb[2]];
    let norm = (sum[0] * sum[0] + sum[1] * sum[1] + sum[2] * sum[2]).sqrt();

    if norm < 1e-12 {
        return destination(a, 90.0, HALF_CIRCUMFERENCE_METERS / 2.0);
    }

    from_unit_vector([sum[0] / norm, sum[1] / norm, sum[2] / norm])
}

/// Wrap a longitude in degrees into `[-180, 180)`.
#[inline]
pub fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) {
        return lon;
    }
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

fn to_unit_vector(p: &GpsPoint) -> [f64; 3] {
    let lat = p.latitude.to_radians();
    let lon = p.longitude.to_radians();
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

fn from_unit_vector(v: [f64; 3]) -> GpsPoint {
    let lat = v[2].atan2((v[0] * v[0] + v[1] * v[1]).sqrt());
    let lon = v[1].atan2(v[0]);
    GpsPoint::new(lat.to_degrees(), lon.to_degrees())
}
