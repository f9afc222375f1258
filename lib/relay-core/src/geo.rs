//! Great-circle distance and nearest-k selection over endpoint locations

use crate::endpoint::{Capability, CapabilityFilter, Location};
use std::collections::BTreeSet;

/// Mean Earth radius in kilometers (spherical model)
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Distances closer than this (in km) are treated as equal when ranking,
/// so load decides the order.
pub const DISTANCE_TOLERANCE_KM: f64 = 1e-6;

/// Great-circle distance between two locations in kilometers (haversine).
pub fn haversine_km(from: Location, to: Location) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_long = (to.long - from.long).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_long / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1.0 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

#[derive(Debug, Clone)]
struct IndexEntry {
    slot: usize,
    id: i64,
    load: u8,
    location: Location,
    capabilities: BTreeSet<Capability>,
}

/// A ranked proximity result: position of the record in the owning
/// snapshot plus its distance from the query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub slot: usize,
    pub distance_km: f64,
}

/// Proximity index over the records of one snapshot.
///
/// Scores every entry and ranks by distance, then load, then id, all
/// ascending. Entries whose distances chain together in steps of at most
/// [`DISTANCE_TOLERANCE_KM`] form one tie group ranked by load, so reported
/// distances are non-decreasing up to that tolerance.
#[derive(Debug, Clone, Default)]
pub struct GeoIndex {
    entries: Vec<IndexEntry>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record stored at `slot` in the owning snapshot
    pub fn insert(
        &mut self,
        slot: usize,
        id: i64,
        load: u8,
        location: Location,
        capabilities: BTreeSet<Capability>,
    ) {
        self.entries.push(IndexEntry {
            slot,
            id,
            load,
            location,
            capabilities,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `limit` entries matching `filter`, closest first.
    pub fn nearest(&self, point: Location, filter: &CapabilityFilter, limit: usize) -> Vec<Neighbor> {
        if limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(f64, u8, i64, usize)> = self
            .entries
            .iter()
            .filter(|e| filter.matches(&e.capabilities))
            .map(|e| (haversine_km(point, e.location), e.load, e.id, e.slot))
            .collect();

        scored.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.2.cmp(&b.2)));

        // Re-rank each run of near-equal distances by (load, id)
        let mut start = 0;
        for end in 1..=scored.len() {
            if end == scored.len() || scored[end].0 - scored[end - 1].0 > DISTANCE_TOLERANCE_KM {
                scored[start..end].sort_unstable_by_key(|&(_, load, id, _)| (load, id));
                start = end;
                if start >= limit {
                    break;
                }
            }
        }
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(distance_km, _, _, slot)| Neighbor { slot, distance_km })
            .collect()
    }
}
