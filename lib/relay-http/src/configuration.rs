//! Per-server OpenVPN configuration files

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Suffix of the configuration file served for each server domain
pub const CONFIGURATION_SUFFIX: &str = ".tcp.ovpn";

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid server domain: {0}")]
    InvalidDomain(String),

    #[error("No configuration for server: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory of `<domain>.tcp.ovpn` files
#[derive(Clone, Debug)]
pub struct ConfigurationStore {
    root: PathBuf,
}

impl ConfigurationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the configuration for `domain`. Domains that could
    /// escape the root directory are rejected.
    pub fn path_for(&self, domain: &str) -> Result<PathBuf, ConfigurationError> {
        let valid = !domain.is_empty()
            && !domain.starts_with('.')
            && domain
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
        if !valid || domain.contains("..") {
            return Err(ConfigurationError::InvalidDomain(domain.to_string()));
        }
        Ok(self.root.join(format!("{}{}", domain, CONFIGURATION_SUFFIX)))
    }

    /// Read the configuration file for `domain`
    pub async fn read(&self, domain: &str) -> Result<Vec<u8>, ConfigurationError> {
        let path = self.path_for(domain)?;
        match tokio::fs::read(&path).await {
            Ok(contents) => {
                debug!("Read {} bytes from {}", contents.len(), path.display());
                Ok(contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConfigurationError::NotFound(domain.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("relay-http-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn test_path_for_domain() {
        let store = ConfigurationStore::new("/etc/ovpn");
        assert_eq!(
            store.path_for("uk1234.nordvpn.com").unwrap(),
            PathBuf::from("/etc/ovpn/uk1234.nordvpn.com.tcp.ovpn")
        );
    }

    #[test]
    fn test_rejects_traversal() {
        let store = ConfigurationStore::new("/etc/ovpn");
        for bad in ["", "../secret", "a/b", ".hidden", "a..b", "uk1%2F"] {
            assert!(
                matches!(store.path_for(bad), Err(ConfigurationError::InvalidDomain(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_read_existing_and_missing() {
        let root = temp_root("read");
        std::fs::write(root.join("fr12.nordvpn.com.tcp.ovpn"), b"client\nremote 10.0.0.1 443\n").unwrap();
        let store = ConfigurationStore::new(&root);

        let contents = store.read("fr12.nordvpn.com").await.unwrap();
        assert!(contents.starts_with(b"client"));

        assert!(matches!(
            store.read("de1.nordvpn.com").await,
            Err(ConfigurationError::NotFound(_))
        ));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
