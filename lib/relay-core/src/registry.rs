//! Relay registry: the current snapshot behind a single-writer reference

use crate::endpoint::{CapabilityFilter, EndpointRecord, Location};
use crate::snapshot::Snapshot;
use crate::{CoreError, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The published snapshot together with its publish sequence number
#[derive(Clone, Debug)]
struct Published {
    generation: u64,
    snapshot: Arc<Snapshot>,
}

/// RelayRegistry holds the current snapshot and answers queries against it.
///
/// Queries clone the snapshot reference under a short read lock and run
/// without holding any lock, so a publish never waits on a slow reader and
/// a reader never sees records from two snapshots. Until the first publish
/// every query fails with [`CoreError::NotReady`].
pub struct RelayRegistry {
    current: Arc<RwLock<Option<Published>>>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Make `snapshot` the current one. Returns the new generation number.
    pub async fn publish(&self, snapshot: impl Into<Arc<Snapshot>>) -> u64 {
        let snapshot = snapshot.into();
        let records = snapshot.len();

        let mut current = self.current.write().await;
        let generation = current.as_ref().map_or(1, |p| p.generation + 1);
        *current = Some(Published {
            generation,
            snapshot,
        });

        info!("Published registry snapshot {} with {} servers", generation, records);
        generation
    }

    /// The current snapshot
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        let current = self.current.read().await;
        current
            .as_ref()
            .map(|p| p.snapshot.clone())
            .ok_or(CoreError::NotReady)
    }

    /// Generation of the current snapshot, 0 before the first publish
    pub async fn generation(&self) -> u64 {
        let current = self.current.read().await;
        current.as_ref().map_or(0, |p| p.generation)
    }

    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Nearest records to (`lat`, `long`) carrying every capability in `filter`.
    ///
    /// `limit` must not be negative; zero yields an empty result.
    pub async fn nearest(
        &self,
        lat: f64,
        long: f64,
        filter: &CapabilityFilter,
        limit: i64,
    ) -> Result<Vec<EndpointRecord>> {
        let limit = usize::try_from(limit)
            .map_err(|_| CoreError::InvalidArgument(format!("limit must be >= 0, got {}", limit)))?;
        let point = Location::new(lat, long)?;
        let snapshot = self.snapshot().await?;

        debug!("Nearest query at ({}, {}) limit {}", lat, long, limit);
        Ok(snapshot.nearest(point, filter, limit))
    }

    /// Records in `country` (exact match) ordered by ascending load
    pub async fn by_country(&self, country: &str) -> Result<Vec<EndpointRecord>> {
        let snapshot = self.snapshot().await?;
        debug!("Country query for {}", country);
        Ok(snapshot.by_country(country))
    }

    /// Distinct country names in the current snapshot, alphabetically
    pub async fn countries(&self) -> Result<Vec<String>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.countries())
    }

    /// Number of records in the current snapshot, 0 before the first publish
    pub async fn record_count(&self) -> usize {
        self.snapshot().await.map_or(0, |s| s.len())
    }
}

impl Default for RelayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Capability;
    use crate::snapshot::tests::{build, record};

    fn london_paris() -> Snapshot {
        build(vec![
            record(1, "United Kingdom", 30, 51.5074, -0.1278),
            record(2, "France", 10, 48.8566, 2.3522),
        ])
    }

    #[tokio::test]
    async fn test_not_ready_before_publish() {
        let registry = RelayRegistry::new();
        assert!(!registry.is_ready().await);
        assert_eq!(registry.generation().await, 0);
        assert_eq!(registry.countries().await.unwrap_err(), CoreError::NotReady);
        assert_eq!(registry.by_country("France").await.unwrap_err(), CoreError::NotReady);
        assert_eq!(
            registry.nearest(0.0, 0.0, &CapabilityFilter::all(), 1).await.unwrap_err(),
            CoreError::NotReady
        );
        assert_eq!(registry.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_nearest_round_trip() {
        let registry = RelayRegistry::new();
        registry.publish(london_paris()).await;

        let result = registry
            .nearest(51.5, -0.1, &CapabilityFilter::any(), 1)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 1);
        assert!(result[0].distance.unwrap() < 5.0);
    }

    #[tokio::test]
    async fn test_nearest_argument_errors() {
        let registry = RelayRegistry::new();
        registry.publish(london_paris()).await;

        assert!(registry
            .nearest(51.5, -0.1, &CapabilityFilter::all(), 0)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            registry.nearest(51.5, -0.1, &CapabilityFilter::all(), -1).await,
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.nearest(91.0, -0.1, &CapabilityFilter::all(), 1).await,
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_nearest_properties() {
        let mut records = Vec::new();
        for i in 0..200i64 {
            let mut r = record(i, "Grid", (i % 100) as u8, -60.0 + (i % 20) as f64 * 6.0, -170.0 + (i / 20) as f64 * 34.0);
            if i % 3 == 0 {
                r.capabilities.remove(&Capability::WireguardUdp);
            }
            records.push(r);
        }
        let registry = RelayRegistry::new();
        registry.publish(build(records)).await;

        let filter = CapabilityFilter::requiring([Capability::WireguardUdp]);
        let result = registry.nearest(10.0, 20.0, &filter, 25).await.unwrap();
        assert_eq!(result.len(), 25);
        assert!(result.iter().all(|r| r.has_capability(Capability::WireguardUdp)));
        assert!(result
            .windows(2)
            .all(|w| w[0].distance.unwrap() <= w[1].distance.unwrap()));
    }

    #[tokio::test]
    async fn test_publish_replaces_snapshot() {
        let registry = RelayRegistry::new();
        assert_eq!(registry.publish(london_paris()).await, 1);
        assert_eq!(registry.countries().await.unwrap(), vec!["France", "United Kingdom"]);

        let generation = registry
            .publish(build(vec![record(9, "Spain", 1, 40.4, -3.7)]))
            .await;
        assert_eq!(generation, 2);
        assert_eq!(registry.countries().await.unwrap(), vec!["Spain"]);
        assert_eq!(registry.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_publish_same_content_is_idempotent() {
        let registry = RelayRegistry::new();
        registry.publish(london_paris()).await;
        let before = registry
            .nearest(50.0, 0.0, &CapabilityFilter::all(), 10)
            .await
            .unwrap();

        registry.publish(london_paris()).await;
        let after = registry
            .nearest(50.0, 0.0, &CapabilityFilter::all(), 10)
            .await
            .unwrap();

        let ids = |v: &[EndpointRecord]| v.iter().map(|r| (r.id, r.distance)).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
        assert_eq!(
            registry.by_country("France").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_reader_keeps_old_snapshot() {
        let registry = RelayRegistry::new();
        registry.publish(london_paris()).await;
        let held = registry.snapshot().await.unwrap();

        registry
            .publish(build(vec![record(9, "Spain", 1, 40.4, -3.7)]))
            .await;

        assert_eq!(held.countries(), vec!["France", "United Kingdom"]);
        assert_eq!(registry.countries().await.unwrap(), vec!["Spain"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishes_are_serialized() {
        let registry = Arc::new(RelayRegistry::new());
        registry
            .publish(build(vec![record(0, "Initial", 1, 0.0, 0.0)]))
            .await;

        let publishers: Vec<_> = (1..=16i64)
            .map(|n| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let country = format!("Country{:02}", n);
                    let snapshot = build(vec![record(n, &country, 1, 0.0, 0.0)]);
                    (registry.publish(snapshot).await, country)
                })
            })
            .collect();

        let mut published = Vec::new();
        for result in futures::future::join_all(publishers).await {
            published.push(result.unwrap());
        }
        published.sort();

        let generations: Vec<u64> = published.iter().map(|(generation, _)| *generation).collect();
        assert_eq!(generations, (2..=17).collect::<Vec<u64>>());
        assert_eq!(registry.generation().await, 17);

        let (_, last_country) = published.last().unwrap();
        assert_eq!(registry.countries().await.unwrap(), vec![last_country.clone()]);
        assert_eq!(registry.record_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queries_never_mix_snapshots() {
        let alpha: Arc<Snapshot> = Arc::new(build(
            (0..50).map(|i| record(i, "Alpha", (i % 10) as u8, 10.0, i as f64)).collect(),
        ));
        let beta: Arc<Snapshot> = Arc::new(build(
            (100..150).map(|i| record(i, "Beta", (i % 10) as u8, -10.0, (i - 100) as f64)).collect(),
        ));

        let registry = Arc::new(RelayRegistry::new());
        registry.publish(alpha.clone()).await;

        let writer = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    let next = if i % 2 == 0 { beta.clone() } else { alpha.clone() };
                    registry.publish(next).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    for _ in 0..300 {
                        let countries = registry.countries().await.unwrap();
                        assert_eq!(countries.len(), 1, "mixed snapshot: {:?}", countries);

                        let result = registry
                            .nearest(0.0, 0.0, &CapabilityFilter::all(), 100)
                            .await
                            .unwrap();
                        assert_eq!(result.len(), 50);
                        let country = &result[0].country;
                        assert!(result.iter().all(|r| &r.country == country));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for result in futures::future::join_all(readers).await {
            result.unwrap();
        }
    }
}
