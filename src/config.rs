// Copyright (c) 2025 - Cowboy AI, Inc.
//! Simulation configuration
//!
//! The raw [`SimulationConfig`] mirrors the JSON context block operators
//! already keep for the environment (`env`, `onPremises`, `cloud`). It is
//! checked exactly once, when the deployment graph is assembled, and turned
//! into a [`ValidatedConfig`] that every unit constructor receives.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{Cidr, Site, SubnetType};
use crate::errors::{ProvisioningError, ProvisioningResult};

/// Prefix length of every subnet carved from a site network
pub const SUBNET_PREFIX: u8 = 24;

/// Upper bound on availability zones per site
pub const MAX_AZS: u8 = 6;

/// Amazon-side ASN used when the cloud site does not set one
pub const DEFAULT_CLOUD_ASN: u32 = 64512;

/// Environment naming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    pub org: String,
    pub env_purpose: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            org: "example".to_string(),
            env_purpose: "vpn-sim".to_string(),
        }
    }
}

/// One simulated network as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub name: String,
    pub cidr: String,
    pub max_azs: u8,
    /// BGP ASN; required on premises, optional for the cloud side
    #[serde(rename = "ASN", default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    /// Placement of the compute subnets
    #[serde(default)]
    pub subnet_type: SubnetType,
}

impl SiteConfig {
    fn default_on_premises() -> Self {
        Self {
            name: "onprem".to_string(),
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            asn: Some(65000),
            subnet_type: SubnetType::PrivateWithEgress,
        }
    }

    fn default_cloud() -> Self {
        Self {
            name: "cloud".to_string(),
            cidr: "10.1.0.0/16".to_string(),
            max_azs: 2,
            asn: None,
            subnet_type: SubnetType::PrivateWithEgress,
        }
    }
}

/// Simulation configuration as loaded from disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default)]
    pub env: EnvironmentConfig,

    #[serde(default = "default_region")]
    pub region: String,

    /// Log group receiving flow logs of both networks
    #[serde(default = "default_flow_log_group")]
    pub flow_log_group: String,

    #[serde(default = "SiteConfig::default_on_premises")]
    pub on_premises: SiteConfig,

    #[serde(default = "SiteConfig::default_cloud")]
    pub cloud: SiteConfig,

    /// Launch one test instance per site after routing is in place
    #[serde(default)]
    pub test_instances: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_flow_log_group() -> String {
    "/aws/vpc/flowlogs".to_string()
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            env: EnvironmentConfig::default(),
            region: default_region(),
            flow_log_group: default_flow_log_group(),
            on_premises: SiteConfig::default_on_premises(),
            cloud: SiteConfig::default_cloud(),
            test_instances: false,
        }
    }
}

impl SimulationConfig {
    /// Parse configuration from a JSON string
    pub fn from_json_str(raw: &str) -> ProvisioningResult<Self> {
        serde_json::from_str(raw).map_err(|e| ProvisioningError::Configuration(e.to_string()))
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> ProvisioningResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProvisioningError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Check every invariant and produce the typed form units consume
    pub fn validate(&self) -> ProvisioningResult<ValidatedConfig> {
        if self.env.org.trim().is_empty() || self.env.env_purpose.trim().is_empty() {
            return Err(config_error("env.org and env.envPurpose must not be empty"));
        }
        if self.region.trim().is_empty() {
            return Err(config_error("region must not be empty"));
        }
        if self.flow_log_group.trim().is_empty() {
            return Err(config_error("flowLogGroup must not be empty"));
        }

        let on_premises_asn = self
            .on_premises
            .asn
            .ok_or_else(|| config_error("onPremises.ASN is required"))?;
        let cloud_asn = self.cloud.asn.unwrap_or(DEFAULT_CLOUD_ASN);

        let on_premises = SitePlan::from_config(
            Site::OnPremises,
            &self.on_premises,
            on_premises_asn,
            &self.region,
        )?;
        let cloud = SitePlan::from_config(Site::Cloud, &self.cloud, cloud_asn, &self.region)?;

        if on_premises.cidr.overlaps(&cloud.cidr) {
            return Err(config_error(format!(
                "site networks overlap: {} and {}",
                on_premises.cidr, cloud.cidr
            )));
        }
        if on_premises.asn == cloud.asn {
            return Err(config_error(format!(
                "both sites use ASN {}",
                on_premises.asn
            )));
        }

        Ok(ValidatedConfig {
            env: self.env.clone(),
            region: self.region.clone(),
            flow_log_group: self.flow_log_group.clone(),
            on_premises,
            cloud,
            test_instances: self.test_instances,
        })
    }
}

fn config_error(msg: impl Into<String>) -> ProvisioningError {
    ProvisioningError::Configuration(msg.into())
}

/// A site after validation, with its subnet layout
///
/// Layout follows the usual VPC convention: the compute group takes the first
/// `max_azs` /24 blocks, the public group the next `max_azs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitePlan {
    pub site: Site,
    pub name: String,
    pub cidr: Cidr,
    pub max_azs: u8,
    pub asn: u32,
    pub subnet_type: SubnetType,
    pub availability_zones: Vec<String>,
}

impl SitePlan {
    fn from_config(
        site: Site,
        config: &SiteConfig,
        asn: u32,
        region: &str,
    ) -> ProvisioningResult<Self> {
        if config.name.trim().is_empty() {
            return Err(config_error(format!("{} name must not be empty", site)));
        }
        if config.max_azs == 0 || config.max_azs > MAX_AZS {
            return Err(config_error(format!(
                "{} maxAzs must be between 1 and {} (got {})",
                site, MAX_AZS, config.max_azs
            )));
        }
        if asn == 0 {
            return Err(config_error(format!("{} ASN must be non-zero", site)));
        }
        if config.subnet_type == SubnetType::Public {
            return Err(config_error(format!(
                "{} compute subnets must be private",
                site
            )));
        }

        let cidr = Cidr::new(&config.cidr)?;
        let needed = 2 * u64::from(config.max_azs);
        let capacity = cidr.subnet_capacity(SUBNET_PREFIX).map_err(|_| {
            config_error(format!(
                "{} network {} is smaller than a /{} subnet",
                site, cidr, SUBNET_PREFIX
            ))
        })?;
        if capacity < needed {
            return Err(config_error(format!(
                "{} network {} holds {} /{} subnets, {} needed",
                site, cidr, capacity, SUBNET_PREFIX, needed
            )));
        }

        let availability_zones = (0..config.max_azs)
            .map(|i| format!("{}{}", region, (b'a' + i) as char))
            .collect();

        Ok(Self {
            site,
            name: config.name.clone(),
            cidr,
            max_azs: config.max_azs,
            asn,
            subnet_type: config.subnet_type,
            availability_zones,
        })
    }

    /// CIDR of the compute subnet in availability zone `az`
    pub fn compute_subnet(&self, az: u8) -> ProvisioningResult<Cidr> {
        Ok(self.cidr.subnet(SUBNET_PREFIX, u32::from(az))?)
    }

    /// CIDR of the public subnet in availability zone `az`
    pub fn public_subnet(&self, az: u8) -> ProvisioningResult<Cidr> {
        Ok(self
            .cidr
            .subnet(SUBNET_PREFIX, u32::from(self.max_azs) + u32::from(az))?)
    }

    /// Whether private service endpoints are needed for the compute subnets
    pub fn needs_service_endpoints(&self) -> bool {
        self.subnet_type == SubnetType::PrivateIsolated
    }
}

/// Configuration after validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedConfig {
    pub env: EnvironmentConfig,
    pub region: String,
    pub flow_log_group: String,
    pub on_premises: SitePlan,
    pub cloud: SitePlan,
    pub test_instances: bool,
}

impl ValidatedConfig {
    pub fn site(&self, site: Site) -> &SitePlan {
        match site {
            Site::OnPremises => &self.on_premises,
            Site::Cloud => &self.cloud,
        }
    }

    /// `org-purpose-name` resource name prefix
    pub fn resource_name(&self, name: &str) -> String {
        format!("{}-{}-{}", self.env.org, self.env.env_purpose, name)
    }
}
