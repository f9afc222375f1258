//! HTTP surface for the relay registry
pub mod configuration;
pub mod query;
pub mod response;
pub mod service;
pub mod tls;

pub use configuration::{ConfigurationError, ConfigurationStore};
pub use query::{parse_servers_query, ServersQuery};
pub use service::RelayService;
pub use tls::TlsServerConfig;
