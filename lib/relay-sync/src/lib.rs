//! Registry refresh: pipeline, scheduling and refresh metrics
pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;

pub use config::RefreshConfig;
pub use metrics::RefreshMetrics;
pub use pipeline::{RefreshPipeline, RefreshReport};
pub use scheduler::{RefreshScheduler, RefreshTrigger};
