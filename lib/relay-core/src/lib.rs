//! Core relay registry functionality
//!
//! This library provides:
//! - Endpoint records and the capability vocabulary
//! - Great-circle distance and nearest-k selection
//! - Immutable registry snapshots and the snapshot builder
//! - The registry that publishes snapshots and answers queries

pub mod endpoint;
pub mod error;
pub mod geo;
pub mod registry;
pub mod snapshot;

pub use endpoint::{Capability, CapabilityFilter, EndpointRecord, Location, MAX_LOAD};
pub use error::{CoreError, Result};
pub use geo::{haversine_km, GeoIndex, EARTH_RADIUS_KM};
pub use registry::RelayRegistry;
pub use snapshot::{Snapshot, SnapshotBuilder};
