//! Refresh pipeline: fetch, validate, build and publish a snapshot

use crate::config::RefreshConfig;
use crate::metrics::RefreshMetrics;
use chrono::Utc;
use relay_core::{CoreError, RelayRegistry, Result, SnapshotBuilder};
use relay_feed::{parse_server_definitions, UpstreamFeed};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one successful refresh
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshReport {
    /// Records in the published snapshot
    pub record_count: usize,
    /// Server definitions dropped as invalid
    pub dropped: usize,
    /// Generation the registry assigned to the snapshot
    pub generation: u64,
    /// Wall time from fetch start to publish
    pub duration: Duration,
}

/// Builds a fresh snapshot from the upstream feed and publishes it.
///
/// Every run starts from scratch: servers missing from the latest payload
/// are gone after the publish. A run that fails or is cancelled leaves the
/// registry exactly as it was.
pub struct RefreshPipeline {
    feed: Arc<dyn UpstreamFeed>,
    registry: Arc<RelayRegistry>,
    metrics: RefreshMetrics,
    config: RefreshConfig,
}

impl RefreshPipeline {
    pub fn new(
        feed: Arc<dyn UpstreamFeed>,
        registry: Arc<RelayRegistry>,
        metrics: RefreshMetrics,
        config: RefreshConfig,
    ) -> Self {
        Self {
            feed,
            registry,
            metrics,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<RelayRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &RefreshMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Run one refresh cycle.
    ///
    /// The fetch is bounded by the configured timeout and abandoned as soon
    /// as `cancel` fires. Cancellation observed before the publish discards
    /// the snapshot under construction.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<RefreshReport> {
        let result = self.refresh(cancel).await;
        match &result {
            Ok(report) => {
                self.metrics
                    .record_success(report.record_count, report.dropped, report.duration);
            }
            Err(CoreError::Cancelled) => {
                info!("Registry refresh cancelled, snapshot discarded");
                self.metrics.record_cancelled();
            }
            Err(e) => {
                warn!("Registry refresh failed: {}", e);
                let dropped = match e {
                    CoreError::EmptyUpstream { dropped } => *dropped,
                    _ => 0,
                };
                self.metrics.record_failure(dropped);
            }
        }
        result
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<RefreshReport> {
        let start = Instant::now();
        let built_at = Utc::now();
        debug!("Fetching server definitions from {}", self.feed.name());

        let payload = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(CoreError::Cancelled),

            fetched = tokio::time::timeout(
                self.config.fetch_timeout,
                self.feed.fetch_server_definitions(),
            ) => match fetched {
                Ok(payload) => payload?,
                Err(_) => {
                    return Err(CoreError::UpstreamUnavailable(format!(
                        "fetch timed out after {:?}",
                        self.config.fetch_timeout
                    )))
                }
            },
        };

        let candidates = parse_server_definitions(&payload)?;
        info!("{} server definitions downloaded...", candidates.len());

        let mut builder = SnapshotBuilder::new(built_at);
        for candidate in candidates {
            match candidate {
                Ok(record) => {
                    if let Err(e) = builder.push(record) {
                        debug!("Server definition not added to snapshot: {}", e);
                    }
                }
                Err(e) => {
                    builder.reject(e);
                }
            }
        }
        let dropped = builder.dropped();
        let snapshot = builder.build()?;

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let record_count = snapshot.len();
        let generation = self.registry.publish(snapshot).await;
        let duration = start.elapsed();

        if dropped > 0 {
            warn!("Dropped {} invalid server definitions", dropped);
        }
        info!("Registry updated in {:?} ({} servers)", duration, record_count);

        Ok(RefreshReport {
            record_count,
            dropped,
            generation,
            duration,
        })
    }
}
