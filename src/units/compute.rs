// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test instances
//!
//! One instance per site in the first compute subnet, reachable by ICMP from
//! every compute subnet of the other site. Only useful once routing is in
//! place, so the unit depends on the route binder.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::network::{NetworkHandle, SubnetGroup};
use crate::cloud::{ResourceKind, ResourceProvisioner, ResourceSpec};
use crate::config::ValidatedConfig;
use crate::deferred::{DeferredValue, OutputDocument, ValueSource};
use crate::domain::Site;
use crate::engine::UnitContext;
use crate::errors::ProvisioningResult;
use crate::graph::{UnitId, UnitPayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInstancesHandle {
    unit: UnitId,
}

impl TestInstancesHandle {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn instance_id(&self, site: Site) -> DeferredValue {
        DeferredValue::new(self.unit.clone(), format!("{}.instance_id", site))
    }
}

pub struct TestInstancesUnit {
    config: Arc<ValidatedConfig>,
    provisioner: Arc<dyn ResourceProvisioner>,
    network: NetworkHandle,
}

impl TestInstancesUnit {
    pub fn new(
        config: Arc<ValidatedConfig>,
        provisioner: Arc<dyn ResourceProvisioner>,
        network: NetworkHandle,
    ) -> Self {
        Self {
            config,
            provisioner,
            network,
        }
    }

    fn peer_subnet_cidrs(&self, site: Site) -> Vec<DeferredValue> {
        let peer = site.peer();
        (0..self.config.site(peer).max_azs)
            .map(|az| self.network.subnet_cidr(peer, SubnetGroup::Compute, az))
            .collect()
    }
}

#[async_trait]
impl UnitPayload for TestInstancesUnit {
    fn consumes(&self) -> Vec<DeferredValue> {
        Site::ALL
            .into_iter()
            .flat_map(|site| {
                let mut values = vec![
                    self.network.vpc_id(site),
                    self.network.compute_subnet_id(site, 0),
                ];
                values.extend(self.peer_subnet_cidrs(site));
                values
            })
            .collect()
    }

    async fn apply(&self, ctx: &UnitContext<'_>) -> ProvisioningResult<OutputDocument> {
        let mut out = OutputDocument::new();

        for site in Site::ALL {
            let plan = self.config.site(site);
            let vpc_id = ctx.resolve(&self.network.vpc_id(site))?;
            let subnet_id = ctx.resolve(&self.network.compute_subnet_id(site, 0))?;
            let ingress = self
                .peer_subnet_cidrs(site)
                .iter()
                .map(|cidr| -> ProvisioningResult<Value> {
                    Ok(json!({ "protocol": "icmp", "cidr": ctx.resolve(cidr)? }))
                })
                .collect::<ProvisioningResult<Vec<_>>>()?;

            let security_group = self
                .provisioner
                .create(
                    &ResourceSpec::new(
                        ResourceKind::SecurityGroup,
                        format!("{}-instance-sg", plan.name),
                    )
                    .with("vpcId", vpc_id)
                    .with("description", format!("ICMP from {}", site.peer()))
                    .with("ingress", Value::Array(ingress)),
                )
                .await?;

            let instance = self
                .provisioner
                .create(
                    &ResourceSpec::new(ResourceKind::Instance, format!("{}-instance", plan.name))
                        .with("name", self.config.resource_name(&format!("{}-instance", plan.name)))
                        .with("subnetId", subnet_id)
                        .with("securityGroupIds", json!([security_group.physical_id])),
                )
                .await?;

            out.insert(format!("{}.instance_id", site), instance.physical_id);
            out.insert(format!("{}.security_group_id", site), security_group.physical_id);
        }

        info!(unit = %ctx.unit_id(), "Test instances launched");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::SimulatedCloud;
    use crate::config::SimulationConfig;
    use crate::deferred::Outputs;
    use crate::units::NetworkTopologyUnit;

    #[tokio::test]
    async fn test_instances_allow_peer_icmp() {
        let cloud = Arc::new(SimulatedCloud::new());
        let config = Arc::new(SimulationConfig::default().validate().unwrap());
        let network_id = UnitId::new("network");
        let mut outputs = Outputs::new();

        let network = NetworkTopologyUnit::new(config.clone(), cloud.clone());
        let doc = network.apply(&UnitContext::new(&network_id, &outputs)).await.unwrap();
        outputs.publish(network_id.clone(), doc).unwrap();

        let unit = TestInstancesUnit::new(config, cloud.clone(), NetworkHandle::new(network_id));
        let id = UnitId::new("test-instances");
        let doc = unit.apply(&UnitContext::new(&id, &outputs)).await.unwrap();
        outputs.publish(id.clone(), doc).unwrap();

        assert_eq!(cloud.resources_of(ResourceKind::Instance).len(), 2);
        let groups = cloud.resources_of(ResourceKind::SecurityGroup);
        assert_eq!(
            groups[0].properties["ingress"],
            json!([
                { "protocol": "icmp", "cidr": "10.1.0.0/24" },
                { "protocol": "icmp", "cidr": "10.1.1.0/24" }
            ])
        );
        assert!(outputs
            .resolve(&TestInstancesHandle::new(id).instance_id(Site::Cloud))
            .is_ok());
    }
}
