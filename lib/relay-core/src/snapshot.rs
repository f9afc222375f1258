//! Immutable point-in-time view of the registry

use crate::endpoint::{CapabilityFilter, EndpointRecord, Location};
use crate::geo::GeoIndex;
use crate::{CoreError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Endpoint records ordered by id, plus the proximity index and a
/// per-country view over the same records. Never mutated once built.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Vec<EndpointRecord>,
    index: GeoIndex,
    // country -> slots ordered by (load, id)
    countries: BTreeMap<String, Vec<usize>>,
    built_at: DateTime<Utc>,
}

impl Snapshot {
    fn from_records(records: Vec<EndpointRecord>, built_at: DateTime<Utc>) -> Self {
        let mut index = GeoIndex::new();
        let mut countries: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (slot, record) in records.iter().enumerate() {
            index.insert(
                slot,
                record.id,
                record.load,
                record.location,
                record.capabilities.clone(),
            );
            countries.entry(record.country.clone()).or_default().push(slot);
        }

        for slots in countries.values_mut() {
            slots.sort_by_key(|&slot| (records[slot].load, records[slot].id));
        }

        Self {
            records,
            index,
            countries,
            built_at,
        }
    }

    /// All records in ascending id order
    pub fn records(&self) -> &[EndpointRecord] {
        &self.records
    }

    pub fn get(&self, id: i64) -> Option<&EndpointRecord> {
        self.records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|slot| &self.records[slot])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Start time of the refresh cycle that built this snapshot
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Up to `limit` records matching `filter`, closest to `point` first,
    /// each carrying its distance in kilometers.
    pub fn nearest(&self, point: Location, filter: &CapabilityFilter, limit: usize) -> Vec<EndpointRecord> {
        self.index
            .nearest(point, filter, limit)
            .into_iter()
            .map(|neighbor| {
                let mut record = self.records[neighbor.slot].clone();
                record.distance = Some(neighbor.distance_km);
                record
            })
            .collect()
    }

    /// Records whose country equals `country` exactly, by ascending load
    pub fn by_country(&self, country: &str) -> Vec<EndpointRecord> {
        self.countries
            .get(country)
            .map(|slots| slots.iter().map(|&slot| self.records[slot].clone()).collect())
            .unwrap_or_default()
    }

    /// Distinct country names, alphabetically
    pub fn countries(&self) -> Vec<String> {
        self.countries.keys().cloned().collect()
    }
}

/// Assembles a snapshot from candidate records, dropping the invalid ones.
///
/// Every accepted record is stamped with the builder's `built_at` time.
/// Duplicate ids keep the first occurrence.
#[derive(Debug)]
pub struct SnapshotBuilder {
    records: BTreeMap<i64, EndpointRecord>,
    dropped: usize,
    built_at: DateTime<Utc>,
}

impl SnapshotBuilder {
    pub fn new(built_at: DateTime<Utc>) -> Self {
        Self {
            records: BTreeMap::new(),
            dropped: 0,
            built_at,
        }
    }

    /// Validate and add a record. An invalid record is counted as dropped
    /// and the validation error is returned to the caller.
    pub fn push(&mut self, mut record: EndpointRecord) -> Result<()> {
        if let Err(e) = record.validate() {
            return Err(self.reject(e));
        }
        if self.records.contains_key(&record.id) {
            return Err(self.reject(CoreError::InvalidRecord(format!(
                "duplicate server id {}",
                record.id
            ))));
        }

        record.updated_at = self.built_at;
        record.distance = None;
        debug!("Accepted server {} ({})", record.id, record.name);
        self.records.insert(record.id, record);
        Ok(())
    }

    /// Count a candidate that never made it to a record (e.g. failed to parse)
    pub fn reject(&mut self, reason: CoreError) -> CoreError {
        warn!("Dropping server definition: {}", reason);
        self.dropped += 1;
        reason
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Finish the snapshot. Zero accepted records is a failed build.
    pub fn build(self) -> Result<Snapshot> {
        if self.records.is_empty() {
            return Err(CoreError::EmptyUpstream {
                dropped: self.dropped,
            });
        }
        let records = self.records.into_values().collect();
        Ok(Snapshot::from_records(records, self.built_at))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::endpoint::Capability;

    pub(crate) fn record(id: i64, country: &str, load: u8, lat: f64, long: f64) -> EndpointRecord {
        EndpointRecord {
            id,
            ip_address: format!("10.0.0.{}", id % 255),
            name: format!("{} #{}", country, id),
            domain: format!("srv{}.example.com", id),
            country: country.to_string(),
            load,
            capabilities: Capability::ALL.into_iter().collect(),
            location: Location { lat, long },
            updated_at: DateTime::<Utc>::MIN_UTC,
            distance: None,
        }
    }

    pub(crate) fn build(records: Vec<EndpointRecord>) -> Snapshot {
        let mut builder = SnapshotBuilder::new(Utc::now());
        for r in records {
            builder.push(r).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_builder_drops_invalid_records() {
        let mut builder = SnapshotBuilder::new(Utc::now());
        builder.push(record(1, "France", 10, 48.8, 2.3)).unwrap();
        builder.push(record(2, "France", 20, 48.9, 2.4)).unwrap();
        builder.push(record(3, "Germany", 30, 52.5, 13.4)).unwrap();
        let err = builder.push(record(4, "Nowhere", 10, 200.0, 0.0)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecord(_)));

        assert_eq!(builder.dropped(), 1);
        let snapshot = builder.build().unwrap();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.get(4).is_none());
    }

    #[test]
    fn test_builder_keeps_first_duplicate() {
        let mut builder = SnapshotBuilder::new(Utc::now());
        builder.push(record(1, "France", 10, 48.8, 2.3)).unwrap();
        assert!(builder.push(record(1, "Spain", 10, 40.4, -3.7)).is_err());
        assert_eq!(builder.dropped(), 1);

        let snapshot = builder.build().unwrap();
        assert_eq!(snapshot.get(1).unwrap().country, "France");
    }

    #[test]
    fn test_builder_stamps_updated_at() {
        let built_at = Utc::now();
        let mut builder = SnapshotBuilder::new(built_at);
        builder.push(record(7, "Italy", 1, 41.9, 12.5)).unwrap();
        let snapshot = builder.build().unwrap();
        assert_eq!(snapshot.get(7).unwrap().updated_at, built_at);
        assert_eq!(snapshot.built_at(), built_at);
    }

    #[test]
    fn test_empty_build_fails() {
        let mut builder = SnapshotBuilder::new(Utc::now());
        let _ = builder.push(record(1, "Nowhere", 10, 0.0, 500.0));
        assert_eq!(
            builder.build().unwrap_err(),
            CoreError::EmptyUpstream { dropped: 1 }
        );
    }

    #[test]
    fn test_records_ordered_by_id() {
        let snapshot = build(vec![
            record(30, "Spain", 1, 40.4, -3.7),
            record(10, "Spain", 1, 40.4, -3.7),
            record(20, "Spain", 1, 40.4, -3.7),
        ]);
        let ids: Vec<_> = snapshot.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_by_country_sorted_by_load() {
        let snapshot = build(vec![
            record(1, "Germany", 40, 52.5, 13.4),
            record(2, "Germany", 5, 50.1, 8.7),
            record(3, "France", 1, 48.8, 2.3),
            record(4, "Germany", 20, 53.5, 10.0),
        ]);

        let germany = snapshot.by_country("Germany");
        let loads: Vec<_> = germany.iter().map(|r| r.load).collect();
        assert_eq!(loads, vec![5, 20, 40]);
        assert!(germany.iter().all(|r| r.country == "Germany"));

        assert!(snapshot.by_country("germany").is_empty());
        assert!(snapshot.by_country("Atlantis").is_empty());
    }

    #[test]
    fn test_countries_sorted_and_distinct() {
        let snapshot = build(vec![
            record(1, "Sweden", 1, 59.3, 18.0),
            record(2, "Austria", 1, 48.2, 16.3),
            record(3, "Sweden", 2, 57.7, 11.9),
            record(4, "Japan", 1, 35.6, 139.6),
        ]);
        assert_eq!(snapshot.countries(), vec!["Austria", "Japan", "Sweden"]);
    }

    #[test]
    fn test_nearest_sets_distance() {
        let snapshot = build(vec![
            record(1, "United Kingdom", 30, 51.5074, -0.1278),
            record(2, "France", 10, 48.8566, 2.3522),
        ]);

        let result = snapshot.nearest(Location { lat: 51.5, long: -0.1 }, &CapabilityFilter::all(), 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 1);
        assert!(result[0].distance.unwrap() < 5.0);
        assert!(snapshot.get(1).unwrap().distance.is_none());
    }
}
