//! HTTP client for the upstream server feed

use relay_core::{CoreError, Result};
use std::time::Duration;
use tracing::debug;

/// Public server list published by the upstream provider
pub const DEFAULT_FEED_URL: &str = "https://nordvpn.com/api/server";

/// Upstream feed client configuration
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// URL returning the JSON array of server definitions
    pub url: String,
    /// Timeout for the whole request, body included
    pub timeout: Duration,
    /// User-Agent header sent upstream
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("relay-registry/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// FeedClient wraps the reqwest client used to download server definitions
pub struct FeedClient {
    client: reqwest::Client,
    config: FeedConfig,
}

impl FeedClient {
    /// Create a new feed client
    pub fn new(config: FeedConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Download the raw payload. Transport failures and non-success
    /// statuses are reported as [`CoreError::UpstreamUnavailable`].
    pub async fn fetch(&self) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("failed fetching server definitions: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::UpstreamUnavailable(format!(
                "failed fetching server definitions: status code was {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("failed reading server definitions payload: {}", e)))?;

        debug!("Downloaded {} bytes from {}", body.len(), self.config.url);
        Ok(body.to_vec())
    }
}
