// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tunnel configuration lookups
//!
//! The negotiated configuration of a VPN connection flattens to keys such as
//! `vpn_connection.ipsec_tunnel.0.ike.pre_shared_key`. Lookups are addressed
//! by `(tunnel, section, field)`:
//!
//! | tunnel | prefix                          |   | section | group              |
//! |--------|---------------------------------|---|---------|--------------------|
//! | 1      | `vpn_connection.ipsec_tunnel.0` |   | `cgw`   | `customer_gateway` |
//! | 2      | `vpn_connection.ipsec_tunnel.1` |   | `vgw`   | `vpn_gateway`      |
//! |        |                                 |   | `ike`   | `ike`              |
//!
//! Anything outside these tables is an illegal argument.

use std::fmt;
use std::str::FromStr;

use super::{Binding, BindingError};
use crate::deferred::{DeferredValue, OutputDocument};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::graph::UnitId;

/// Which of the two redundant tunnels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TunnelIndex {
    One,
    Two,
}

impl TunnelIndex {
    pub const ALL: [TunnelIndex; 2] = [TunnelIndex::One, TunnelIndex::Two];

    /// Flattened key prefix of this tunnel
    pub fn prefix(&self) -> &'static str {
        match self {
            TunnelIndex::One => "vpn_connection.ipsec_tunnel.0",
            TunnelIndex::Two => "vpn_connection.ipsec_tunnel.1",
        }
    }

    /// 1-based tunnel number
    pub fn number(&self) -> u8 {
        match self {
            TunnelIndex::One => 1,
            TunnelIndex::Two => 2,
        }
    }
}

impl TryFrom<u8> for TunnelIndex {
    type Error = BindingError;

    fn try_from(tunnel: u8) -> Result<Self, Self::Error> {
        match tunnel {
            1 => Ok(TunnelIndex::One),
            2 => Ok(TunnelIndex::Two),
            other => Err(BindingError::IllegalArgument(format!(
                "tunnel must be 1 or 2, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TunnelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tunnel{}", self.number())
    }
}

/// Configuration group within a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TunnelSection {
    /// Customer side (`cgw`)
    CustomerGateway,
    /// Provider side (`vgw`)
    VpnGateway,
    /// Negotiation and key material (`ike`)
    Ike,
}

impl TunnelSection {
    pub const ALL: [TunnelSection; 3] = [
        TunnelSection::CustomerGateway,
        TunnelSection::VpnGateway,
        TunnelSection::Ike,
    ];

    /// Short identifier used in lookups
    pub fn id(&self) -> &'static str {
        match self {
            TunnelSection::CustomerGateway => "cgw",
            TunnelSection::VpnGateway => "vgw",
            TunnelSection::Ike => "ike",
        }
    }

    /// Element name in the configuration document
    pub fn group(&self) -> &'static str {
        match self {
            TunnelSection::CustomerGateway => "customer_gateway",
            TunnelSection::VpnGateway => "vpn_gateway",
            TunnelSection::Ike => "ike",
        }
    }
}

impl FromStr for TunnelSection {
    type Err = BindingError;

    fn from_str(section: &str) -> Result<Self, Self::Err> {
        TunnelSection::ALL
            .into_iter()
            .find(|s| s.id() == section)
            .ok_or_else(|| {
                BindingError::IllegalArgument(format!(
                    "section must be one of cgw, vgw, ike; got {:?}",
                    section
                ))
            })
    }
}

/// Canonical flattened key for `(tunnel, section, field)`
pub fn config_key(tunnel: u8, section: &str, field: &str) -> Result<String, BindingError> {
    let tunnel = TunnelIndex::try_from(tunnel)?;
    let section = section.parse::<TunnelSection>()?;
    Ok(section_key(tunnel, section, field))
}

fn section_key(tunnel: TunnelIndex, section: TunnelSection, field: &str) -> String {
    format!("{}.{}.{}", tunnel.prefix(), section.group(), field)
}

/// Allow-list of prefixes covering every tunnel section
pub fn output_paths() -> Vec<String> {
    TunnelIndex::ALL
        .into_iter()
        .flat_map(|tunnel| {
            TunnelSection::ALL
                .into_iter()
                .map(move |section| format!("{}.{}", tunnel.prefix(), section.group()))
        })
        .collect()
}

/// Handle on a tunnel configuration that a given producer will resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    producer: UnitId,
}

impl TunnelConfig {
    pub fn new(producer: UnitId) -> Self {
        Self { producer }
    }

    pub fn producer(&self) -> &UnitId {
        &self.producer
    }

    /// Deferred lookup of one field
    pub fn get_config(
        &self,
        tunnel: u8,
        section: &str,
        field: &str,
    ) -> Result<DeferredValue, BindingError> {
        Ok(DeferredValue::new(
            self.producer.clone(),
            config_key(tunnel, section, field)?,
        ))
    }

    /// `ip_address/network_cidr` of a tunnel inside address
    pub fn inside_cidr(&self, tunnel: u8, section: &str) -> Result<Binding, BindingError> {
        Ok(Binding::concat([
            self.get_config(tunnel, section, "tunnel_inside_address.ip_address")?
                .into(),
            "/".into(),
            self.get_config(tunnel, section, "tunnel_inside_address.network_cidr")?
                .into(),
        ]))
    }

    pub fn output_paths(&self) -> Vec<String> {
        output_paths()
    }
}

/// Flattened tunnel configuration of one VPN connection
///
/// Immutable once created; a new query produces a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfigDocument(OutputDocument);

impl TunnelConfigDocument {
    /// Read a field directly, failing if the document does not carry it
    pub fn field(&self, tunnel: u8, section: &str, field: &str) -> ProvisioningResult<&str> {
        let key = config_key(tunnel, section, field)?;
        self.0
            .get(&key)
            .ok_or(ProvisioningError::MissingOutput {
                producer: "tunnel-config".to_string(),
                path: key,
            })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_document(&self) -> &OutputDocument {
        &self.0
    }

    pub fn into_document(self) -> OutputDocument {
        self.0
    }
}

impl From<OutputDocument> for TunnelConfigDocument {
    fn from(document: OutputDocument) -> Self {
        Self(document)
    }
}
