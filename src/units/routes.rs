// Copyright (c) 2025 - Cowboy AI, Inc.
//! Route Binder
//!
//! Cloud compute subnets send on-premises traffic to the transit hub.
//! On-premises compute subnets send cloud traffic straight to the gateway
//! instance's network attachment. The plan is a pure function of the
//! resolved inputs; the unit only resolves, plans and creates.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::gateway::GatewayHandle;
use super::network::NetworkHandle;
use super::tunnel::TunnelHandle;
use crate::cloud::{ResourceKind, ResourceProvisioner, ResourceSpec};
use crate::config::ValidatedConfig;
use crate::deferred::{DeferredValue, OutputDocument, ValueSource};
use crate::domain::{Cidr, Site};
use crate::engine::UnitContext;
use crate::errors::ProvisioningResult;
use crate::graph::{UnitId, UnitPayload};

/// Where a route sends matching traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NextHop {
    TransitHub(String),
    NetworkAttachment(String),
}

/// One route to install
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteIntent {
    pub name: String,
    pub site: Site,
    pub route_table_id: String,
    pub destination_cidr: Cidr,
    pub next_hop: NextHop,
}

/// Resolved values the route plan is computed from
#[derive(Debug, Clone)]
pub struct RoutingInputs {
    pub on_premises_cidr: Cidr,
    pub cloud_cidr: Cidr,
    pub on_premises_route_tables: Vec<String>,
    pub cloud_route_tables: Vec<String>,
    pub transit_hub_id: String,
    pub attachment_id: String,
}

/// One route per compute route table on each side
pub fn plan_routes(inputs: &RoutingInputs) -> Vec<RouteIntent> {
    let to_on_premises = inputs
        .cloud_route_tables
        .iter()
        .enumerate()
        .map(|(i, table)| RouteIntent {
            name: format!("to-onprem-route{}", i),
            site: Site::Cloud,
            route_table_id: table.clone(),
            destination_cidr: inputs.on_premises_cidr,
            next_hop: NextHop::TransitHub(inputs.transit_hub_id.clone()),
        });

    let to_cloud = inputs
        .on_premises_route_tables
        .iter()
        .enumerate()
        .map(|(i, table)| RouteIntent {
            name: format!("to-cloud-route{}", i),
            site: Site::OnPremises,
            route_table_id: table.clone(),
            destination_cidr: inputs.cloud_cidr,
            next_hop: NextHop::NetworkAttachment(inputs.attachment_id.clone()),
        });

    to_on_premises.chain(to_cloud).collect()
}

pub struct RouteBinderUnit {
    config: Arc<ValidatedConfig>,
    provisioner: Arc<dyn ResourceProvisioner>,
    network: NetworkHandle,
    tunnel: TunnelHandle,
    gateway: GatewayHandle,
}

impl RouteBinderUnit {
    pub fn new(
        config: Arc<ValidatedConfig>,
        provisioner: Arc<dyn ResourceProvisioner>,
        network: NetworkHandle,
        tunnel: TunnelHandle,
        gateway: GatewayHandle,
    ) -> Self {
        Self {
            config,
            provisioner,
            network,
            tunnel,
            gateway,
        }
    }

    fn route_tables(&self, site: Site) -> Vec<DeferredValue> {
        (0..self.config.site(site).max_azs)
            .map(|az| self.network.compute_route_table_id(site, az))
            .collect()
    }

    fn inputs(&self, source: &dyn ValueSource) -> ProvisioningResult<RoutingInputs> {
        let resolve_all = |values: Vec<DeferredValue>| {
            values
                .iter()
                .map(|value| source.resolve(value))
                .collect::<ProvisioningResult<Vec<_>>>()
        };

        Ok(RoutingInputs {
            on_premises_cidr: self.config.on_premises.cidr,
            cloud_cidr: self.config.cloud.cidr,
            on_premises_route_tables: resolve_all(self.route_tables(Site::OnPremises))?,
            cloud_route_tables: resolve_all(self.route_tables(Site::Cloud))?,
            transit_hub_id: source.resolve(&self.tunnel.transit_gateway_id())?,
            attachment_id: source.resolve(&self.gateway.primary_attachment_id())?,
        })
    }
}

#[async_trait]
impl UnitPayload for RouteBinderUnit {
    fn consumes(&self) -> Vec<DeferredValue> {
        let mut values = self.route_tables(Site::OnPremises);
        values.extend(self.route_tables(Site::Cloud));
        values.push(self.tunnel.transit_gateway_id());
        values.push(self.gateway.primary_attachment_id());
        values
    }

    async fn apply(&self, ctx: &UnitContext<'_>) -> ProvisioningResult<OutputDocument> {
        let routes = plan_routes(&self.inputs(ctx)?);
        let mut out = OutputDocument::new();

        for route in &routes {
            let spec = ResourceSpec::new(ResourceKind::Route, route.name.clone())
                .with("routeTableId", route.route_table_id.clone())
                .with("destinationCidrBlock", route.destination_cidr.to_string());
            let spec = match &route.next_hop {
                NextHop::TransitHub(id) => spec.with("transitGatewayId", id.clone()),
                NextHop::NetworkAttachment(id) => spec.with("networkInterfaceId", id.clone()),
            };

            let created = self.provisioner.create(&spec).await?;
            out.insert(format!("{}.{}", route.site, route.name), created.physical_id);
        }

        for site in Site::ALL {
            let count = routes.iter().filter(|r| r.site == site).count();
            out.insert(format!("{}.route_count", site), count.to_string());
        }

        info!(unit = %ctx.unit_id(), routes = routes.len(), "Routes installed");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inputs(cloud_tables: usize, on_premises_tables: usize) -> RoutingInputs {
        RoutingInputs {
            on_premises_cidr: Cidr::new("10.0.0.0/16").unwrap(),
            cloud_cidr: Cidr::new("10.1.0.0/16").unwrap(),
            on_premises_route_tables: (0..on_premises_tables)
                .map(|i| format!("rtb-onprem-{}", i))
                .collect(),
            cloud_route_tables: (0..cloud_tables).map(|i| format!("rtb-cloud-{}", i)).collect(),
            transit_hub_id: "tgw-1".to_string(),
            attachment_id: "eni-1".to_string(),
        }
    }

    #[test]
    fn test_route_plan() {
        let routes = plan_routes(&inputs(2, 1));

        assert_eq!(
            routes,
            vec![
                RouteIntent {
                    name: "to-onprem-route0".to_string(),
                    site: Site::Cloud,
                    route_table_id: "rtb-cloud-0".to_string(),
                    destination_cidr: Cidr::new("10.0.0.0/16").unwrap(),
                    next_hop: NextHop::TransitHub("tgw-1".to_string()),
                },
                RouteIntent {
                    name: "to-onprem-route1".to_string(),
                    site: Site::Cloud,
                    route_table_id: "rtb-cloud-1".to_string(),
                    destination_cidr: Cidr::new("10.0.0.0/16").unwrap(),
                    next_hop: NextHop::TransitHub("tgw-1".to_string()),
                },
                RouteIntent {
                    name: "to-cloud-route0".to_string(),
                    site: Site::OnPremises,
                    route_table_id: "rtb-onprem-0".to_string(),
                    destination_cidr: Cidr::new("10.1.0.0/16").unwrap(),
                    next_hop: NextHop::NetworkAttachment("eni-1".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_empty_sides() {
        assert!(plan_routes(&inputs(0, 0)).is_empty());
        assert_eq!(plan_routes(&inputs(0, 3)).len(), 3);
    }
}
