//! Sources of upstream server definitions

use crate::client::{FeedClient, FeedConfig};
use async_trait::async_trait;
use relay_core::{CoreError, Result};
use std::path::Path;
use tracing::debug;

/// A source of raw server-definition payloads.
///
/// Implementations must be cancel-safe: the refresh pipeline drops the
/// returned future on shutdown or timeout.
#[async_trait]
pub trait UpstreamFeed: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        "upstream"
    }

    /// Fetch the raw JSON payload
    async fn fetch_server_definitions(&self) -> Result<Vec<u8>>;
}

/// Feed backed by the upstream HTTP API
pub struct HttpFeed {
    client: FeedClient,
}

impl HttpFeed {
    pub fn new(config: FeedConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: FeedClient::new(config)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.client.config().url
    }
}

#[async_trait]
impl UpstreamFeed for HttpFeed {
    fn name(&self) -> &str {
        self.url()
    }

    async fn fetch_server_definitions(&self) -> Result<Vec<u8>> {
        self.client.fetch().await
    }
}

/// Feed that always returns the same payload or the same error.
///
/// Used for offline runs from a saved payload and in tests.
#[derive(Clone, Debug)]
pub struct StaticFeed {
    payload: std::result::Result<Vec<u8>, CoreError>,
}

impl StaticFeed {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: Ok(payload.into()),
        }
    }

    pub fn failing(error: CoreError) -> Self {
        Self { payload: Err(error) }
    }

    /// Load a payload saved to disk
    pub async fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let payload = tokio::fs::read(path).await?;
        debug!("Loaded {} bytes of server definitions from {}", payload.len(), path.display());
        Ok(Self::new(payload))
    }
}

#[async_trait]
impl UpstreamFeed for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_server_definitions(&self) -> Result<Vec<u8>> {
        self.payload.clone()
    }
}
