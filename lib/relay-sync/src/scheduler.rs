//! Periodic refresh scheduling
//!
//! The scheduler runs the refresh pipeline once at startup and then on a
//! fixed interval until shutdown is signalled. A failed refresh is logged
//! and the next tick still fires. An on-demand refresh can be requested
//! through a [`RefreshTrigger`]; it also restarts the interval.
//!
//! ```ignore
//! let scheduler = RefreshScheduler::new(pipeline)?;
//! let trigger = scheduler.trigger();
//! tokio::spawn(scheduler.run(shutdown_token));
//! ```

use crate::pipeline::RefreshPipeline;
use relay_core::{CoreError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle for requesting an out-of-band refresh
#[derive(Clone, Debug)]
pub struct RefreshTrigger {
    notify: Arc<Notify>,
}

impl RefreshTrigger {
    /// Request a refresh. Requests made while one is pending coalesce.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }
}

/// Background task driving the refresh pipeline
pub struct RefreshScheduler {
    pipeline: Arc<RefreshPipeline>,
    interval: Duration,
    notify: Arc<Notify>,
}

impl RefreshScheduler {
    /// Create a scheduler using the pipeline's configured interval.
    ///
    /// Fails with [`CoreError::InvalidArgument`] if that interval is zero.
    pub fn new(pipeline: Arc<RefreshPipeline>) -> Result<Self> {
        let interval = check_interval(pipeline.config().interval)?;
        Ok(Self {
            pipeline,
            interval,
            notify: Arc::new(Notify::new()),
        })
    }

    /// Override the refresh interval; zero is rejected
    pub fn with_interval(mut self, interval: Duration) -> Result<Self> {
        self.interval = check_interval(interval)?;
        Ok(self)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn trigger(&self) -> RefreshTrigger {
        RefreshTrigger {
            notify: self.notify.clone(),
        }
    }

    /// Run until `shutdown` is cancelled. An in-flight refresh is abandoned
    /// on shutdown and publishes nothing.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "Refresh scheduler starting with interval {:?}",
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown signalled, stopping refresh scheduler...");
                    break;
                }

                _ = self.notify.notified() => {
                    info!("Refresh requested on demand");
                    ticker.reset();
                }

                _ = ticker.tick() => {
                    debug!("Scheduled refresh tick");
                }
            }

            match self.pipeline.run_once(&shutdown).await {
                Ok(report) => {
                    info!(
                        "Refreshed registry: {} servers, {} dropped, generation {}",
                        report.record_count, report.dropped, report.generation
                    );
                }
                Err(CoreError::Cancelled) => {}
                Err(e) => {
                    warn!("Error refreshing servers, keeping previous snapshot: {}", e);
                }
            }
        }
    }
}

fn check_interval(interval: Duration) -> Result<Duration> {
    if interval.is_zero() {
        return Err(CoreError::InvalidArgument(
            "refresh interval must be greater than zero".to_string(),
        ));
    }
    Ok(interval)
}
