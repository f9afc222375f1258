//! Gateway configuration from environment variables

use anyhow::{Context, Result};
use relay_feed::FeedConfig;
use relay_sync::RefreshConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_FEED_URL: &str = "RELAY_FEED_URL";
pub const ENV_REFRESH_INTERVAL: &str = "RELAY_REFRESH_INTERVAL_SECS";
pub const ENV_FETCH_TIMEOUT: &str = "RELAY_FETCH_TIMEOUT_SECS";
pub const ENV_FILES_LOCATION: &str = "OVPN_FILES_LOCATION";
pub const ENV_HTTP_ADDR: &str = "RELAY_HTTP_ADDR";
pub const ENV_HTTPS_ADDR: &str = "RELAY_HTTPS_ADDR";
pub const ENV_TLS_CERT: &str = "RELAY_TLS_CERT";
pub const ENV_TLS_KEY: &str = "RELAY_TLS_KEY";
pub const ENV_LOG_FORMAT: &str = "RELAY_LOG_FORMAT";

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub feed: FeedConfig,
    pub refresh: RefreshConfig,
    /// Directory holding `<domain>.tcp.ovpn` files
    pub files_location: PathBuf,
    pub http_addr: SocketAddr,
    pub https_addr: SocketAddr,
    /// Certificate and key paths; HTTPS is served only when both are set
    pub tls: Option<(PathBuf, PathBuf)>,
    pub json_logs: bool,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; unset keys take defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut feed = FeedConfig::default();
        if let Some(url) = get(ENV_FEED_URL) {
            feed.url = url;
        }

        let mut refresh = RefreshConfig::default();
        if let Some(secs) = get(ENV_REFRESH_INTERVAL) {
            refresh.interval = parse_secs(ENV_REFRESH_INTERVAL, &secs)?;
        }
        if let Some(secs) = get(ENV_FETCH_TIMEOUT) {
            refresh.fetch_timeout = parse_secs(ENV_FETCH_TIMEOUT, &secs)?;
        }
        feed.timeout = refresh.fetch_timeout;

        let http_addr = get(ENV_HTTP_ADDR)
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .with_context(|| format!("{} is not a socket address", ENV_HTTP_ADDR))?;
        let https_addr = get(ENV_HTTPS_ADDR)
            .unwrap_or_else(|| "0.0.0.0:8443".to_string())
            .parse()
            .with_context(|| format!("{} is not a socket address", ENV_HTTPS_ADDR))?;

        let tls = match (get(ENV_TLS_CERT), get(ENV_TLS_KEY)) {
            (Some(cert), Some(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            _ => None,
        };

        Ok(Self {
            feed,
            refresh,
            files_location: PathBuf::from(get(ENV_FILES_LOCATION).unwrap_or_else(|| ".".to_string())),
            http_addr,
            https_addr,
            tls,
            json_logs: get(ENV_LOG_FORMAT).is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, value))?;
    if secs == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_secs(secs))
}
