//! TLS/HTTPS support for the registry gateway

use anyhow::{anyhow, Context, Result};
use rustls::pki_types::PrivateKeyDer;
use rustls::{ServerConfig, SupportedProtocolVersion};
use rustls_pemfile::{certs, read_all};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// TLS configuration for the HTTPS listener
#[derive(Clone)]
pub struct TlsServerConfig {
    /// Rustls server configuration
    pub config: Arc<ServerConfig>,
    /// Minimum TLS version
    pub min_version: String,
}

impl TlsServerConfig {
    /// Protocol versions allowed for a minimum version string
    pub fn protocol_versions(min_version: &str) -> Result<Vec<&'static SupportedProtocolVersion>> {
        match min_version {
            "1.2" => Ok(vec![&rustls::version::TLS13, &rustls::version::TLS12]),
            "1.3" => Ok(vec![&rustls::version::TLS13]),
            _ => Err(anyhow!(
                "Invalid TLS version: {}. Must be 1.2 or 1.3",
                min_version
            )),
        }
    }

    /// Create a TLS configuration from PEM-encoded certificate chain and private key
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8], min_version: Option<String>) -> Result<Self> {
        debug!("Creating TLS configuration from PEM data");

        let min_version = min_version.unwrap_or_else(|| "1.2".to_string());
        let versions = Self::protocol_versions(&min_version)?;

        let mut cert_reader = BufReader::new(cert_pem);
        let cert_chain = certs(&mut cert_reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("Failed to parse certificates: {}", e))?;

        if cert_chain.is_empty() {
            return Err(anyhow!("No certificates found in PEM data"));
        }
        debug!("Loaded {} certificate(s)", cert_chain.len());

        let mut key_reader = BufReader::new(key_pem);
        let private_key = read_all(&mut key_reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("Failed to parse private key: {}", e))?
            .into_iter()
            .find_map(|item| match item {
                rustls_pemfile::Item::Pkcs1Key(k) => Some(PrivateKeyDer::Pkcs1(k)),
                rustls_pemfile::Item::Pkcs8Key(k) => Some(PrivateKeyDer::Pkcs8(k)),
                rustls_pemfile::Item::Sec1Key(k) => Some(PrivateKeyDer::Sec1(k)),
                _ => None,
            })
            .ok_or_else(|| anyhow!("No private key found in PEM data"))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)
            .map_err(|e| anyhow!("Failed to select TLS versions: {}", e))?
            .with_no_client_auth()
            .with_single_cert(cert_chain, private_key)
            .map_err(|e| anyhow!("Failed to create TLS config: {}", e))?;

        info!("TLS configuration created with minimum version {}", min_version);

        Ok(Self {
            config: Arc::new(config),
            min_version,
        })
    }

    /// Load certificate chain and key from PEM files
    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert = std::fs::read(cert_path)
            .with_context(|| format!("Failed to read TLS certificate from {}", cert_path.display()))?;
        let key = std::fs::read(key_path)
            .with_context(|| format!("Failed to read TLS key from {}", key_path.display()))?;
        let config = Self::from_pem(&cert, &key, None)?;
        info!(
            "TLS configuration loaded from {} and {}",
            cert_path.display(),
            key_path.display()
        );
        Ok(config)
    }
}
