//! Endpoint records and the capability vocabulary

use crate::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Transport a relay can serve
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    OpenvpnUdp,
    OpenvpnTcp,
    WireguardUdp,
}

impl Capability {
    /// Every capability the registry recognizes
    pub const ALL: [Capability; 3] = [
        Capability::OpenvpnUdp,
        Capability::OpenvpnTcp,
        Capability::WireguardUdp,
    ];

    /// Key used for this capability in upstream payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::OpenvpnUdp => "openvpn_udp",
            Capability::OpenvpnTcp => "openvpn_tcp",
            Capability::WireguardUdp => "wireguard_udp",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::InvalidArgument(format!("unknown capability: {}", s)))
    }
}

/// Capabilities a record must carry to match a proximity query.
///
/// A record matches iff it has every required capability. The default
/// requires all known capabilities; [`CapabilityFilter::any`] requires none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityFilter {
    required: BTreeSet<Capability>,
}

impl CapabilityFilter {
    /// Require every capability in `required`
    pub fn requiring<I>(required: I) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        Self {
            required: required.into_iter().collect(),
        }
    }

    /// Require all known capabilities
    pub fn all() -> Self {
        Self::requiring(Capability::ALL)
    }

    /// Match every record
    pub fn any() -> Self {
        Self::requiring([])
    }

    /// Build a filter from capability names, failing on unknown names
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let required = names
            .into_iter()
            .map(|n| n.as_ref().parse::<Capability>())
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(Self { required })
    }

    pub fn required(&self) -> &BTreeSet<Capability> {
        &self.required
    }

    pub fn matches(&self, capabilities: &BTreeSet<Capability>) -> bool {
        self.required.is_subset(capabilities)
    }
}

impl Default for CapabilityFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// A (latitude, longitude) pair in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
}

impl Location {
    /// Create a location, rejecting non-finite or out-of-range coordinates
    pub fn new(lat: f64, long: f64) -> Result<Self> {
        let location = Self { lat, long };
        if !location.is_valid() {
            return Err(CoreError::InvalidArgument(format!(
                "coordinates out of range: lat={}, long={}",
                lat, long
            )));
        }
        Ok(location)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.long.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.long)
    }
}

/// Highest load value a relay can report
pub const MAX_LOAD: u8 = 100;

/// One relay endpoint as published in a snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub id: i64,
    pub ip_address: String,
    pub name: String,
    pub domain: String,
    pub country: String,
    pub load: u8,
    pub capabilities: BTreeSet<Capability>,
    pub location: Location,
    pub updated_at: DateTime<Utc>,
    /// Kilometers from the query point; only set on proximity results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl EndpointRecord {
    /// Check the per-record invariants: coordinates in range and load in [0, 100]
    pub fn validate(&self) -> Result<()> {
        if !self.location.is_valid() {
            return Err(CoreError::InvalidRecord(format!(
                "server {} has out-of-range location ({}, {})",
                self.id, self.location.lat, self.location.long
            )));
        }
        if self.load > MAX_LOAD {
            return Err(CoreError::InvalidRecord(format!(
                "server {} has load {} above {}",
                self.id, self.load, MAX_LOAD
            )));
        }
        Ok(())
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
