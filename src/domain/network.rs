// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("CIDR {0} has host bits set (expected {1})")]
    NotCanonical(String, String),

    #[error("Invalid prefix length: {0} (must be between {1} and 32)")]
    InvalidPrefixLength(u8, u8),

    #[error("Subnet index {index} out of range for /{prefix} in {parent} ({available} available)")]
    SubnetOutOfRange {
        parent: String,
        prefix: u8,
        index: u32,
        available: u64,
    },
}

/// IPv4 network block value object
///
/// Invariants:
/// - Valid IPv4 network in CIDR notation
/// - Canonical: the address is the network address (no host bits set)
///
/// # Examples
///
/// ```rust
/// use vpn_sim::domain::Cidr;
///
/// let cidr = Cidr::new("10.0.0.0/16").unwrap();
/// assert_eq!(cidr.prefix(), 16);
/// assert_eq!(cidr.subnet(24, 3).unwrap().to_string(), "10.0.3.0/24");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr(Ipv4Network);

impl Cidr {
    /// Parse a canonical IPv4 CIDR block
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();
        let network = Ipv4Network::from_str(cidr)
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        // Invariant: "10.0.0.5/16" is rejected instead of silently truncated
        if network.ip() != network.network() {
            let canonical = format!("{}/{}", network.network(), network.prefix());
            return Err(NetworkError::NotCanonical(cidr.to_string(), canonical));
        }

        Ok(Self(network))
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Prefix length
    pub fn prefix(&self) -> u8 {
        self.0.prefix()
    }

    /// Check if an address falls within this block
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.0.contains(addr)
    }

    /// Check if two blocks share any address
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other.network()) || other.contains(self.network())
    }

    /// Number of `/prefix` blocks that fit in this network
    pub fn subnet_capacity(&self, prefix: u8) -> Result<u64, NetworkError> {
        if prefix < self.prefix() || prefix > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix, self.prefix()));
        }
        Ok(1u64 << (prefix - self.prefix()))
    }

    /// Carve the `index`-th `/prefix` block out of this network
    pub fn subnet(&self, prefix: u8, index: u32) -> Result<Cidr, NetworkError> {
        let available = self.subnet_capacity(prefix)?;
        if u64::from(index) >= available {
            return Err(NetworkError::SubnetOutOfRange {
                parent: self.to_string(),
                prefix,
                index,
                available,
            });
        }

        let block_size = 1u64 << (32 - prefix);
        let base = u64::from(u32::from(self.network())) + u64::from(index) * block_size;
        let network = Ipv4Network::new(Ipv4Addr::from(base as u32), prefix)
            .map_err(|e| NetworkError::InvalidCidr(e.to_string()))?;
        Ok(Self(network))
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.network(), self.0.prefix())
    }
}

impl FromStr for Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Cidr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Cidr::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// One of the two simulated networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    OnPremises,
    Cloud,
}

impl Site {
    /// Both sites, on-premises first
    pub const ALL: [Site; 2] = [Site::OnPremises, Site::Cloud];

    /// Prefix used for this site's keys in output documents
    pub fn key(&self) -> &'static str {
        match self {
            Site::OnPremises => "on_premises",
            Site::Cloud => "cloud",
        }
    }

    /// The opposite site
    pub fn peer(&self) -> Site {
        match self {
            Site::OnPremises => Site::Cloud,
            Site::Cloud => Site::OnPremises,
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Subnet placement class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubnetType {
    /// Private subnet with outbound egress
    #[default]
    PrivateWithEgress,
    /// Private subnet without any internet route; needs service endpoints
    PrivateIsolated,
    /// Public subnet with an internet gateway route
    Public,
}

impl SubnetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetType::PrivateWithEgress => "private_with_egress",
            SubnetType::PrivateIsolated => "private_isolated",
            SubnetType::Public => "public",
        }
    }
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr() {
        let cidr = Cidr::new("10.1.0.0/16").unwrap();
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 1, 0, 0));
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.to_string(), "10.1.0.0/16");
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(Cidr::new("10.0.0.0").is_ok()); // bare address is a /32
        assert!(Cidr::new("999.0.0.0/16").is_err());
        assert!(Cidr::new("10.0.0.0/33").is_err());
        assert!(matches!(
            Cidr::new("10.0.0.5/16"),
            Err(NetworkError::NotCanonical(_, _))
        ));
    }

    #[test]
    fn test_subnet_carving() {
        let vpc = Cidr::new("10.0.0.0/16").unwrap();
        assert_eq!(vpc.subnet(24, 0).unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(vpc.subnet(24, 255).unwrap().to_string(), "10.0.255.0/24");
        assert_eq!(vpc.subnet_capacity(24).unwrap(), 256);
        assert!(vpc.subnet(24, 256).is_err());
        assert!(vpc.subnet(8, 0).is_err());
    }

    #[test]
    fn test_overlap() {
        let a = Cidr::new("10.0.0.0/16").unwrap();
        let b = Cidr::new("10.1.0.0/16").unwrap();
        let c = Cidr::new("10.0.4.0/24").unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&a));
    }

    #[test]
    fn test_cidr_serde() {
        let cidr: Cidr = serde_json::from_str("\"10.0.0.0/16\"").unwrap();
        assert_eq!(serde_json::to_string(&cidr).unwrap(), "\"10.0.0.0/16\"");
        assert!(serde_json::from_str::<Cidr>("\"nope\"").is_err());
    }

    #[test]
    fn test_site_peer() {
        assert_eq!(Site::Cloud.peer(), Site::OnPremises);
        assert_eq!(Site::OnPremises.key(), "on_premises");
    }
}
