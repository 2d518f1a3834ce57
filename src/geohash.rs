//! # Geohash Codec
//!
//! Standard base-32 geohash encoding over a recursively bisected lat/lon box.
//!
//! Each character carries 5 bits. Bits alternate between longitude and latitude,
//! starting with longitude, and each bit halves the current box along its axis.
//! Keys produced here are bit-for-bit compatible with other geohash
//! implementations, so they can be joined against externally generated keys.
//!
//! The codec never fails: out-of-range precision is clamped into `1..=12` and
//! characters outside the alphabet are skipped while decoding.
//!
//! ## Example
//!
//! ```rust
//! use footprint_spatial::geohash;
//!
//! let key = geohash::encode(57.64911, 10.40744, 11);
//! assert_eq!(key, "u4pruydqqvj");
//!
//! let bounds = geohash::bounds(&key);
//! assert!(bounds.min_lat <= 57.64911 && 57.64911 <= bounds.max_lat);
//!
//! // Pick a precision for ~100 m cells
//! assert_eq!(geohash::precision_for_distance(150.0), 7);
//! ```

use crate::geodesy::wrap_longitude;
use crate::{Bounds, GpsPoint};

/// The geohash alphabet (no `a`, `i`, `l`, `o`).
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub const MIN_PRECISION: usize = 1;
pub const MAX_PRECISION: usize = 12;

/// Approximate equatorial cell width in meters, indexed by `precision - 1`.
const CELL_SIZES_METERS: [f64; MAX_PRECISION] = [
    5_000_000.0, // ±2500 km
    625_000.0,   // ±312.5 km
    123_000.0,   // ±61.5 km
    19_500.0,    // ±9.75 km
    3_900.0,     // ±1.95 km
    610.0,       // ±305 m
    120.0,       // ±60 m
    19.0,        // ±9.5 m
    3.7,         // ±1.85 m
    0.6,         // ±30 cm
    0.12,        // ±6 cm
    0.019,       // ±0.95 cm
];

/// Clamp a requested precision into `1..=12`.
#[inline]
pub fn clamp_precision(precision: i32) -> usize {
    precision.clamp(MIN_PRECISION as i32, MAX_PRECISION as i32) as usize
}

/// Encode a coordinate into a geohash key of `precision` characters.
///
/// `precision` is clamped into `1..=12`; the returned key always has exactly
/// the clamped length.
pub fn encode(lat: f64, lon: f64, precision: i32) -> String {
    let precision = clamp_precision(precision);

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);

    let mut key = String::with_capacity(precision);
    let mut ch = 0usize;
    let mut bits = 0;
    let mut even = true;

    while key.len() < precision {
        let (range, value) = if even {
            (&mut lon_range, lon)
        } else {
            (&mut lat_range, lat)
        };

        let mid = (range.0 + range.1) / 2.0;
        if value > mid {
            ch |= 1 << (4 - bits);
            range.0 = mid;
        } else {
            range.1 = mid;
        }

        even = !even;
        bits += 1;
        if bits == 5 {
            key.push(BASE32[ch] as char);
            bits = 0;
            ch = 0;
        }
    }

    key
}

/// Decode a key into the center of its cell.
///
/// An empty key (or one with no recognised characters) decodes to `(0, 0)`.
pub fn decode(key: &str) -> GpsPoint {
    bounds(key).center()
}

/// Bounding box of the cell named by `key`.
///
/// Characters outside [`BASE32`] are skipped without affecting the box.
pub fn bounds(key: &str) -> Bounds {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut even = true;

    for idx in key.bytes().filter_map(base32_index) {
        for shift in (0..5).rev() {
            let range = if even { &mut lon_range } else { &mut lat_range };
            let mid = (range.0 + range.1) / 2.0;
            if idx & (1 << shift) != 0 {
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            even = !even;
        }
    }

    Bounds {
        min_lat: lat_range.0,
        max_lat: lat_range.1,
        min_lng: lon_range.0,
        max_lng: lon_range.1,
    }
}

/// The 8 cells surrounding `key`, at the same precision.
///
/// Order is row-major from south-west to north-east, skipping the center:
/// `(S,W) (S,·) (S,E) (·,W) (·,E) (N,W) (N,·) (N,E)`.
///
/// Latitude is clamped at the poles, so cells on the top or bottom row of the
/// world repeat themselves there. Longitude wraps across the antimeridian.
///
/// The output precision is the byte length of `key`, including characters
/// that [`bounds`] skips. A key with a stray character is treated as one level
/// finer than the cell it decodes to, so its neighbors are that many
/// characters long and sit around the cell center.
pub fn neighbors(key: &str) -> Vec<String> {
    let cell = bounds(key);
    let center = cell.center();
    let precision = key.len() as i32;
    let height = cell.height();
    let width = cell.width();

    let mut out = Vec::with_capacity(8);
    for d_row in -1..=1 {
        for d_col in -1..=1 {
            if d_row == 0 && d_col == 0 {
                continue;
            }
            let lat = (center.latitude + d_row as f64 * height).clamp(-90.0, 90.0);
            let lon = wrap_longitude(center.longitude + d_col as f64 * width);
            out.push(encode(lat, lon, precision));
        }
    }
    out
}

/// Approximate equatorial cell width for a precision; `0.0` outside `1..=12`.
pub fn cell_size_meters(precision: i32) -> f64 {
    if precision < MIN_PRECISION as i32 || precision > MAX_PRECISION as i32 {
        return 0.0;
    }
    CELL_SIZES_METERS[precision as usize - 1]
}

/// Smallest precision whose cell size is at most `meters`, or 12 if none is.
pub fn precision_for_distance(meters: f64) -> usize {
    (MIN_PRECISION..=MAX_PRECISION)
        .find(|&p| cell_size_meters(p as i32) <= meters)
        .unwrap_or(MAX_PRECISION)
}

#[inline]
fn base32_index(byte: u8) -> Option<usize> {
    BASE32.iter().position(|&c| c == byte)
}
