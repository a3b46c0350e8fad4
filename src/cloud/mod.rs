// Copyright (c) 2025 - Cowboy AI, Inc.
//! External collaborators
//!
//! Everything the units talk to outside this crate sits behind a trait:
//!
//! - [`ResourceProvisioner`] creates declarative cloud resources
//! - [`ConnectionConfigProvider`] returns a VPN connection's negotiated
//!   configuration as an XML document
//! - [`AttachmentDiscovery`] lists the network attachments of an instance
//! - [`SecretStore`](crate::secrets::SecretStore) keeps key material
//!
//! Each call is a single blocking query from the unit's point of view. None
//! of them retry; failures surface to the deployment engine.
//!
//! [`SimulatedCloud`] implements all of them in memory.

pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::secrets::SecretStore;

pub use simulated::{FailurePoint, SimulatedCloud};

/// Kinds of resources the units declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    LogGroup,
    Vpc,
    Subnet,
    RouteTable,
    FlowLog,
    SecurityGroup,
    InterfaceEndpoint,
    GatewayEndpoint,
    TransitGateway,
    ElasticIp,
    CustomerGateway,
    VpnConnection,
    TransitGatewayAttachment,
    GatewayInstance,
    Instance,
    Route,
}

impl ResourceKind {
    /// Prefix of physical identifiers for this kind
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ResourceKind::LogGroup => "lg",
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::RouteTable => "rtb",
            ResourceKind::FlowLog => "fl",
            ResourceKind::SecurityGroup => "sg",
            ResourceKind::InterfaceEndpoint | ResourceKind::GatewayEndpoint => "vpce",
            ResourceKind::TransitGateway => "tgw",
            ResourceKind::ElasticIp => "eipalloc",
            ResourceKind::CustomerGateway => "cgw",
            ResourceKind::VpnConnection => "vpn",
            ResourceKind::TransitGatewayAttachment => "tgw-attach",
            ResourceKind::GatewayInstance | ResourceKind::Instance => "i",
            ResourceKind::Route => "r",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Declarative description of one resource with fully resolved properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub logical_id: String,
    pub properties: Map<String, Value>,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, logical_id: impl Into<String>) -> Self {
        Self {
            kind,
            logical_id: logical_id.into(),
            properties: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// What the provider hands back for a created resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub physical_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ProvisionedResource {
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Read an attribute the provider is expected to return
    pub fn attribute(&self, key: &str) -> ProvisioningResult<&str> {
        self.attributes.get(key).map(String::as_str).ok_or_else(|| {
            ProvisioningError::ExternalQuery(format!(
                "resource {} returned no attribute {}",
                self.physical_id, key
            ))
        })
    }
}

/// Creates declarative resources
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    async fn create(&self, spec: &ResourceSpec) -> ProvisioningResult<ProvisionedResource>;
}

/// Returns the negotiated configuration of a VPN connection
#[async_trait]
pub trait ConnectionConfigProvider: Send + Sync {
    /// One query, returning the configuration XML current at call time
    async fn describe_connection(&self, connection_id: &str) -> ProvisioningResult<String>;
}

/// Lists network attachments of an instance
#[async_trait]
pub trait AttachmentDiscovery: Send + Sync {
    /// Attachment identifiers filtered by instance identifier
    async fn attachments_for_instance(&self, instance_id: &str) -> ProvisioningResult<Vec<String>>;
}

/// Bundle of collaborators handed to unit constructors
#[derive(Clone)]
pub struct CloudServices {
    pub provisioner: Arc<dyn ResourceProvisioner>,
    pub connections: Arc<dyn ConnectionConfigProvider>,
    pub attachments: Arc<dyn AttachmentDiscovery>,
    pub secrets: Arc<dyn SecretStore>,
}

impl CloudServices {
    /// Route every collaborator to one simulated cloud
    pub fn simulated(cloud: Arc<SimulatedCloud>) -> Self {
        Self {
            provisioner: cloud.clone(),
            connections: cloud.clone(),
            attachments: cloud.clone(),
            secrets: cloud,
        }
    }
}

impl fmt::Debug for CloudServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudServices").finish_non_exhaustive()
    }
}
