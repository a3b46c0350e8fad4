// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tunnel Provisioner
//!
//! Creates the transit hub, the elastic address the gateway will present,
//! the customer-gateway record for that address, a dynamically routed VPN
//! connection between the two, and the attachment of the cloud network's
//! compute subnets to the hub.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::network::NetworkHandle;
use crate::cloud::{ResourceKind, ResourceProvisioner, ResourceSpec};
use crate::config::ValidatedConfig;
use crate::deferred::{DeferredValue, OutputDocument, ValueSource};
use crate::domain::Site;
use crate::engine::UnitContext;
use crate::errors::ProvisioningResult;
use crate::graph::{UnitId, UnitPayload};

/// VPN connection type for IPsec tunnels
pub const CONNECTION_TYPE: &str = "ipsec.1";

/// Output keys of the tunnel unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelHandle {
    unit: UnitId,
}

impl TunnelHandle {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    fn value(&self, path: &str) -> DeferredValue {
        DeferredValue::new(self.unit.clone(), path)
    }

    pub fn transit_gateway_id(&self) -> DeferredValue {
        self.value("transit_gateway_id")
    }

    pub fn eip_allocation_id(&self) -> DeferredValue {
        self.value("eip_allocation_id")
    }

    pub fn eip_public_ip(&self) -> DeferredValue {
        self.value("eip_public_ip")
    }

    pub fn customer_gateway_id(&self) -> DeferredValue {
        self.value("customer_gateway_id")
    }

    pub fn vpn_connection_id(&self) -> DeferredValue {
        self.value("vpn_connection_id")
    }

    pub fn attachment_id(&self) -> DeferredValue {
        self.value("attachment_id")
    }
}

pub struct TunnelProvisionerUnit {
    config: Arc<ValidatedConfig>,
    provisioner: Arc<dyn ResourceProvisioner>,
    network: NetworkHandle,
}

impl TunnelProvisionerUnit {
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

    fn cloud_subnets(&self) -> Vec<DeferredValue> {
        (0..self.config.cloud.max_azs)
            .map(|az| self.network.compute_subnet_id(Site::Cloud, az))
            .collect()
    }
}

#[async_trait]
impl UnitPayload for TunnelProvisionerUnit {
    fn consumes(&self) -> Vec<DeferredValue> {
        let mut values = vec![self.network.vpc_id(Site::Cloud)];
        values.extend(self.cloud_subnets());
        values
    }

    async fn apply(&self, ctx: &UnitContext<'_>) -> ProvisioningResult<OutputDocument> {
        let cloud_vpc = ctx.resolve(&self.network.vpc_id(Site::Cloud))?;
        let cloud_subnets = self
            .cloud_subnets()
            .iter()
            .map(|value| ctx.resolve(value))
            .collect::<ProvisioningResult<Vec<_>>>()?;

        let tgw = self
            .provisioner
            .create(
                &ResourceSpec::new(ResourceKind::TransitGateway, "tgw")
                    .with("name", self.config.resource_name("tgw"))
                    .with("amazonSideAsn", self.config.cloud.asn)
                    .with("autoAcceptSharedAttachments", "enable")
                    .with("defaultRouteTableAssociation", "enable")
                    .with("defaultRouteTablePropagation", "enable"),
            )
            .await?;

        let eip = self
            .provisioner
            .create(
                &ResourceSpec::new(ResourceKind::ElasticIp, "gateway-eip")
                    .with("name", self.config.resource_name("gateway-eip"))
                    .with("domain", "vpc"),
            )
            .await?;
        let allocation_id = eip.attribute("allocation_id")?.to_string();
        let public_ip = eip.attribute("public_ip")?.to_string();

        let cgw = self
            .provisioner
            .create(
                &ResourceSpec::new(ResourceKind::CustomerGateway, "cgw")
                    .with("name", self.config.resource_name("cgw"))
                    .with("bgpAsn", self.config.on_premises.asn)
                    .with("ipAddress", public_ip.clone())
                    .with("type", CONNECTION_TYPE),
            )
            .await?;

        let vpn = self
            .provisioner
            .create(
                &ResourceSpec::new(ResourceKind::VpnConnection, "vpn")
                    .with("name", self.config.resource_name("vpn"))
                    .with("customerGatewayId", cgw.physical_id.clone())
                    .with("transitGatewayId", tgw.physical_id.clone())
                    .with("type", CONNECTION_TYPE)
                    .with("staticRoutesOnly", false),
            )
            .await?;

        let attachment = self
            .provisioner
            .create(
                &ResourceSpec::new(ResourceKind::TransitGatewayAttachment, "tgw-attachment")
                    .with("transitGatewayId", tgw.physical_id.clone())
                    .with("vpcId", cloud_vpc)
                    .with("subnetIds", json!(cloud_subnets)),
            )
            .await?;

        info!(
            unit = %ctx.unit_id(),
            transit_gateway_id = %tgw.physical_id,
            vpn_connection_id = %vpn.physical_id,
            "Tunnel resources created"
        );

        let mut out = OutputDocument::new();
        out.insert("transit_gateway_id", tgw.physical_id);
        out.insert("eip_allocation_id", allocation_id);
        out.insert("eip_public_ip", public_ip);
        out.insert("customer_gateway_id", cgw.physical_id);
        out.insert("vpn_connection_id", vpn.physical_id);
        out.insert("attachment_id", attachment.physical_id);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{ConnectionConfigProvider, SimulatedCloud};
    use crate::config::SimulationConfig;
    use crate::deferred::{Outputs, ValueSource};
    use crate::units::NetworkTopologyUnit;

    #[tokio::test]
    async fn test_tunnel_resources() {
        let cloud = Arc::new(SimulatedCloud::new());
        let config = Arc::new(SimulationConfig::default().validate().unwrap());
        let network_id = UnitId::new("network");
        let tunnel_id = UnitId::new("tunnel");
        let mut outputs = Outputs::new();

        let network = NetworkTopologyUnit::new(config.clone(), cloud.clone());
        let doc = network.apply(&UnitContext::new(&network_id, &outputs)).await.unwrap();
        outputs.publish(network_id.clone(), doc).unwrap();

        let unit =
            TunnelProvisionerUnit::new(config, cloud.clone(), NetworkHandle::new(network_id));
        let doc = unit.apply(&UnitContext::new(&tunnel_id, &outputs)).await.unwrap();
        outputs.publish(tunnel_id.clone(), doc).unwrap();

        let handle = TunnelHandle::new(tunnel_id);
        let vpn_id = outputs.resolve(&handle.vpn_connection_id()).unwrap();
        let xml = cloud.describe_connection(&vpn_id).await.unwrap();
        assert!(xml.contains(&outputs.resolve(&handle.eip_public_ip()).unwrap()));
        assert!(xml.contains("<asn>65000</asn>"));

        let attachment = &cloud.resources_of(ResourceKind::TransitGatewayAttachment)[0];
        assert_eq!(attachment.properties["subnetIds"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_requires_network_outputs() {
        let cloud = Arc::new(SimulatedCloud::new());
        let config = Arc::new(SimulationConfig::default().validate().unwrap());
        let unit = TunnelProvisionerUnit::new(
            config,
            cloud.clone(),
            NetworkHandle::new("network".into()),
        );
        let id = UnitId::new("tunnel");
        let outputs = Outputs::new();

        assert!(unit.apply(&UnitContext::new(&id, &outputs)).await.is_err());
        assert!(cloud.resources().is_empty());
    }
}
