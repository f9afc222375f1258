//! Parsing of the upstream server-definition payload

use chrono::Utc;
use relay_core::{Capability, CoreError, EndpointRecord, Location, Result, MAX_LOAD};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Upstream location object
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerLocation {
    pub lat: f64,
    pub long: f64,
}

/// One server object as published by the upstream feed.
///
/// Fields the registry does not use (categories, flags, keywords) are
/// ignored. Feature keys outside the capability vocabulary are ignored too.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerDefinition {
    pub id: Option<i64>,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub country: String,
    pub location: Option<ServerLocation>,
    pub load: Option<i64>,
    #[serde(default)]
    pub features: HashMap<String, bool>,
}

impl ServerDefinition {
    /// Convert into a candidate record. Range checks beyond what the
    /// types force are left to the snapshot builder.
    pub fn into_record(self) -> Result<EndpointRecord> {
        let id = self
            .id
            .ok_or_else(|| CoreError::InvalidRecord(format!("server {:?} has no id", self.name)))?;

        let location = self
            .location
            .ok_or_else(|| CoreError::InvalidRecord(format!("server {} has no location", id)))?;

        let load = self
            .load
            .ok_or_else(|| CoreError::InvalidRecord(format!("server {} has no load", id)))?;
        let load = u8::try_from(load)
            .ok()
            .filter(|l| *l <= MAX_LOAD)
            .ok_or_else(|| CoreError::InvalidRecord(format!("server {} has load {} out of range", id, load)))?;

        let capabilities = Capability::ALL
            .into_iter()
            .filter(|c| self.features.get(c.as_str()).copied().unwrap_or(false))
            .collect();

        Ok(EndpointRecord {
            id,
            ip_address: self.ip_address,
            name: self.name,
            domain: self.domain,
            country: self.country,
            load,
            capabilities,
            location: Location {
                lat: location.lat,
                long: location.long,
            },
            updated_at: Utc::now(),
            distance: None,
        })
    }
}

/// Parse a raw payload into candidate records.
///
/// The payload must be a JSON array, otherwise the whole payload is
/// malformed. Each element is converted independently so one bad server
/// does not poison the rest.
pub fn parse_server_definitions(payload: &[u8]) -> Result<Vec<Result<EndpointRecord>>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(payload)?;
    debug!("{} server definitions in payload", values.len());

    Ok(values
        .into_iter()
        .map(|value| {
            serde_json::from_value::<ServerDefinition>(value)
                .map_err(|e| CoreError::InvalidRecord(e.to_string()))
                .and_then(ServerDefinition::into_record)
        })
        .collect())
}
