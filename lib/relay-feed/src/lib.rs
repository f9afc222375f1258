//! Upstream server feed integration
pub mod client;
pub mod feed;
pub mod payload;

pub use client::{FeedClient, FeedConfig, DEFAULT_FEED_URL};
pub use feed::{HttpFeed, StaticFeed, UpstreamFeed};
pub use payload::{parse_server_definitions, ServerDefinition};
