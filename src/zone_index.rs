//! Spatial index over classified zones.
//!
//! Zone centers go into an R-tree keyed on `[lng, lat]`. Radius queries first
//! collect candidates from a degree envelope around the search circle, then
//! keep only those whose great-circle distance is within the radius.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geodesy::{self, EARTH_RADIUS_METERS};
use crate::{DensityZone, GpsPoint};

#[derive(Debug, Clone, Copy)]
struct IndexedZone {
    idx: usize,
    lng: f64,
    lat: f64,
}

impl RTreeObject for IndexedZone {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

impl PointDistance for IndexedZone {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlng = self.lng - point[0];
        let dlat = self.lat - point[1];
        dlng * dlng + dlat * dlat
    }
}

/// R-tree over zone centers with great-circle radius and nearest lookups.
pub struct ZoneIndex {
    zones: Vec<DensityZone>,
    tree: RTree<IndexedZone>,
}

impl ZoneIndex {
    pub fn new(zones: Vec<DensityZone>) -> Self {
        let entries: Vec<IndexedZone> = zones
            .iter()
            .enumerate()
            .filter(|(_, z)| z.center.is_valid())
            .map(|(idx, z)| IndexedZone {
                idx,
                lng: z.center.longitude,
                lat: z.center.latitude,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
            zones,
        }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn zones(&self) -> &[DensityZone] {
        &self.zones
    }

    /// Zones whose centers lie within `radius_meters` of `center`, nearest first.
    pub fn within_radius(&self, center: &GpsPoint, radius_meters: f64) -> Vec<(&DensityZone, f64)> {
        if !center.is_valid() || !(radius_meters >= 0.0) {
            return vec![];
        }

        let search = search_envelope(center, radius_meters);
        let mut hits: Vec<(&DensityZone, f64)> = self
            .tree
            .locate_in_envelope(&search)
            .filter_map(|entry| {
                let zone = &self.zones[entry.idx];
                let d = geodesy::distance(center, &zone.center);
                (d <= radius_meters).then_some((zone, d))
            })
            .collect();

        hits.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.0.grid_id.cmp(&b.0.grid_id))
        });
        hits
    }

    /// The zone closest to `point` by great-circle distance.
    pub fn nearest(&self, point: &GpsPoint) -> Option<(&DensityZone, f64)> {
        if !point.is_valid() {
            return None;
        }

        // Planar nearest gives an upper bound; the radius query settles it.
        let candidate = self.tree.nearest_neighbor(&[point.longitude, point.latitude])?;
        let bound = geodesy::distance(point, &self.zones[candidate.idx].center);
        self.within_radius(point, bound).into_iter().next()
    }
}

/// Degree box enclosing every point within `radius_meters` of `center`.
fn search_envelope(center: &GpsPoint, radius_meters: f64) -> AABB<[f64; 2]> {
    // Slack so points exactly on the radius survive rounding.
    let angular = radius_meters / EARTH_RADIUS_METERS + 1e-9;
    let lat = center.latitude.to_radians();

    let min_lat = lat - angular;
    let max_lat = lat + angular;
    let half_pi = std::f64::consts::FRAC_PI_2;

    if min_lat <= -half_pi || max_lat >= half_pi {
        return AABB::from_corners(
            [-180.0, min_lat.max(-half_pi).to_degrees()],
            [180.0, max_lat.min(half_pi).to_degrees()],
        );
    }

    let ratio = angular.sin() / lat.cos();
    if angular >= std::f64::consts::FRAC_PI_2 || ratio >= 1.0 {
        return AABB::from_corners([-180.0, min_lat.to_degrees()], [180.0, max_lat.to_degrees()]);
    }

    let dlng = ratio.asin().to_degrees();
    let min_lng = center.longitude - dlng;
    let max_lng = center.longitude + dlng;
    if min_lng < -180.0 || max_lng > 180.0 {
        // Crosses the antimeridian.
        return AABB::from_corners([-180.0, min_lat.to_degrees()], [180.0, max_lat.to_degrees()]);
    }

    AABB::from_corners([min_lng, min_lat.to_degrees()], [max_lng, max_lat.to_degrees()])
}
