// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Topology Builder
//!
//! Creates both site networks. Each site gets a VPC, one compute and one
//! public /24 per availability zone with a route table each, and a flow log
//! capturing all traffic into the shared log group. Isolated compute subnets
//! additionally get the private service endpoints instances need to be
//! managed without internet access.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cloud::{ResourceKind, ResourceProvisioner, ResourceSpec};
use crate::config::{SitePlan, ValidatedConfig};
use crate::deferred::{DeferredValue, OutputDocument};
use crate::domain::Site;
use crate::engine::UnitContext;
use crate::errors::ProvisioningResult;
use crate::graph::{UnitId, UnitPayload};

/// Interface endpoints required by isolated instances
pub const INTERFACE_ENDPOINT_SERVICES: [&str; 3] = ["ssm", "ssmmessages", "ec2messages"];

/// Subnet groups of a site network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetGroup {
    Compute,
    Public,
}

impl SubnetGroup {
    pub fn key(&self) -> &'static str {
        match self {
            SubnetGroup::Compute => "compute",
            SubnetGroup::Public => "public",
        }
    }
}

/// Output keys of the network unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    unit: UnitId,
}

impl NetworkHandle {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    fn value(&self, path: String) -> DeferredValue {
        DeferredValue::new(self.unit.clone(), path)
    }

    pub fn vpc_id(&self, site: Site) -> DeferredValue {
        self.value(format!("{}.vpc_id", site))
    }

    pub fn vpc_cidr(&self, site: Site) -> DeferredValue {
        self.value(format!("{}.cidr", site))
    }

    pub fn subnet_id(&self, site: Site, group: SubnetGroup, az: u8) -> DeferredValue {
        self.value(format!("{}.{}.{}.subnet_id", site, group.key(), az))
    }

    pub fn subnet_cidr(&self, site: Site, group: SubnetGroup, az: u8) -> DeferredValue {
        self.value(format!("{}.{}.{}.cidr", site, group.key(), az))
    }

    pub fn route_table_id(&self, site: Site, group: SubnetGroup, az: u8) -> DeferredValue {
        self.value(format!("{}.{}.{}.route_table_id", site, group.key(), az))
    }

    pub fn compute_subnet_id(&self, site: Site, az: u8) -> DeferredValue {
        self.subnet_id(site, SubnetGroup::Compute, az)
    }

    pub fn compute_route_table_id(&self, site: Site, az: u8) -> DeferredValue {
        self.route_table_id(site, SubnetGroup::Compute, az)
    }

    pub fn public_subnet_id(&self, site: Site, az: u8) -> DeferredValue {
        self.subnet_id(site, SubnetGroup::Public, az)
    }
}

/// Payload creating both site networks
pub struct NetworkTopologyUnit {
    config: Arc<ValidatedConfig>,
    provisioner: Arc<dyn ResourceProvisioner>,
}

impl NetworkTopologyUnit {
    pub fn new(config: Arc<ValidatedConfig>, provisioner: Arc<dyn ResourceProvisioner>) -> Self {
        Self {
            config,
            provisioner,
        }
    }

    async fn build_site(
        &self,
        plan: &SitePlan,
        log_group: &str,
        out: &mut OutputDocument,
    ) -> ProvisioningResult<()> {
        let site = plan.site;
        let name = self.config.resource_name(&plan.name);

        let vpc = self
            .provisioner
            .create(
                &ResourceSpec::new(ResourceKind::Vpc, format!("{}-vpc", plan.name))
                    .with("name", name.clone())
                    .with("cidrBlock", plan.cidr.to_string())
                    .with("maxAzs", plan.max_azs),
            )
            .await?;
        out.insert(format!("{}.vpc_id", site), vpc.physical_id.clone());
        out.insert(format!("{}.cidr", site), plan.cidr.to_string());

        self.provisioner
            .create(
                &ResourceSpec::new(ResourceKind::FlowLog, format!("{}-flow-log", plan.name))
                    .with("resourceId", vpc.physical_id.clone())
                    .with("trafficType", "ALL")
                    .with("logGroupName", log_group),
            )
            .await?;

        let mut compute_subnets = Vec::new();
        let mut compute_route_tables = Vec::new();

        for az in 0..plan.max_azs {
            for group in [SubnetGroup::Compute, SubnetGroup::Public] {
                let (cidr, subnet_type) = match group {
                    SubnetGroup::Compute => (plan.compute_subnet(az)?, plan.subnet_type.as_str()),
                    SubnetGroup::Public => (plan.public_subnet(az)?, "public"),
                };
                let zone = &plan.availability_zones[usize::from(az)];
                let logical = format!("{}-{}-subnet{}", plan.name, group.key(), az);

                let subnet = self
                    .provisioner
                    .create(
                        &ResourceSpec::new(ResourceKind::Subnet, logical.clone())
                            .with("vpcId", vpc.physical_id.clone())
                            .with("cidrBlock", cidr.to_string())
                            .with("availabilityZone", zone.as_str())
                            .with("subnetType", subnet_type)
                            .with("mapPublicIpOnLaunch", group == SubnetGroup::Public),
                    )
                    .await?;
                let route_table = self
                    .provisioner
                    .create(
                        &ResourceSpec::new(ResourceKind::RouteTable, format!("{}-rtb", logical))
                            .with("vpcId", vpc.physical_id.clone())
                            .with("subnetId", subnet.physical_id.clone()),
                    )
                    .await?;

                let prefix = format!("{}.{}.{}", site, group.key(), az);
                out.insert(format!("{}.subnet_id", prefix), subnet.physical_id.clone());
                out.insert(format!("{}.route_table_id", prefix), route_table.physical_id.clone());
                out.insert(format!("{}.cidr", prefix), cidr.to_string());
                out.insert(format!("{}.availability_zone", prefix), zone.clone());

                if group == SubnetGroup::Compute {
                    compute_subnets.push(subnet.physical_id);
                    compute_route_tables.push(route_table.physical_id);
                }
            }
        }

        if plan.needs_service_endpoints() {
            self.build_service_endpoints(
                plan,
                &vpc.physical_id,
                &compute_subnets,
                &compute_route_tables,
            )
            .await?;
        }

        debug!(%site, vpc_id = %vpc.physical_id, subnets = 2 * plan.max_azs, "Site network ready");
        Ok(())
    }

    async fn build_service_endpoints(
        &self,
        plan: &SitePlan,
        vpc_id: &str,
        subnets: &[String],
        route_tables: &[String],
    ) -> ProvisioningResult<()> {
        let security_group = self
            .provisioner
            .create(
                &ResourceSpec::new(ResourceKind::SecurityGroup, format!("{}-ssm-sg", plan.name))
                    .with("vpcId", vpc_id)
                    .with("description", "Allow HTTPS to service endpoints")
                    .with(
                        "ingress",
                        json!([{ "protocol": "tcp", "port": 443, "cidr": plan.cidr.to_string() }]),
                    ),
            )
            .await?;

        for service in INTERFACE_ENDPOINT_SERVICES {
            self.provisioner
                .create(
                    &ResourceSpec::new(
                        ResourceKind::InterfaceEndpoint,
                        format!("{}-{}-endpoint", plan.name, service),
                    )
                    .with("vpcId", vpc_id)
                    .with(
                        "serviceName",
                        format!("com.amazonaws.{}.{}", self.config.region, service),
                    )
                    .with("subnetIds", json!(subnets))
                    .with("securityGroupIds", json!([security_group.physical_id]))
                    .with("privateDnsEnabled", true),
                )
                .await?;
        }

        self.provisioner
            .create(
                &ResourceSpec::new(
                    ResourceKind::GatewayEndpoint,
                    format!("{}-s3-endpoint", plan.name),
                )
                .with("vpcId", vpc_id)
                .with("serviceName", format!("com.amazonaws.{}.s3", self.config.region))
                .with("routeTableIds", json!(route_tables)),
            )
            .await?;

        debug!(site = %plan.site, "Service endpoints created");
        Ok(())
    }
}

#[async_trait]
impl UnitPayload for NetworkTopologyUnit {
    fn consumes(&self) -> Vec<DeferredValue> {
        Vec::new()
    }

    async fn apply(&self, ctx: &UnitContext<'_>) -> ProvisioningResult<OutputDocument> {
        let mut out = OutputDocument::new();

        let log_group = self
            .provisioner
            .create(
                &ResourceSpec::new(ResourceKind::LogGroup, "flow-log-group")
                    .with("logGroupName", self.config.flow_log_group.as_str()),
            )
            .await?;
        out.insert("flow_log_group", self.config.flow_log_group.clone());
        out.insert("flow_log_group_id", log_group.physical_id);

        for site in Site::ALL {
            self.build_site(self.config.site(site), &self.config.flow_log_group, &mut out)
                .await?;
        }

        info!(unit = %ctx.unit_id(), "Networks created");
        Ok(out)
    }
}
