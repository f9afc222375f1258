//! Refresh scheduling configuration

use std::time::Duration;

/// Refresh configuration
#[derive(Clone, Debug)]
pub struct RefreshConfig {
    /// Interval between scheduled refreshes
    pub interval: Duration,
    /// Deadline for a single upstream fetch
    pub fetch_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl RefreshConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RefreshConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_overrides() {
        let config = RefreshConfig::default()
            .with_interval(Duration::from_secs(60))
            .with_fetch_timeout(Duration::from_secs(5));
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
    }
}
