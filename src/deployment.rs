// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment assembly
//!
//! Builds the graph of the VPN test environment from a configuration and a
//! set of cloud collaborators. The configuration is validated once here and
//! shared with every unit; the graph is validated before it is returned, so
//! a [`Deployment`] always holds a graph the engine will accept.

use std::sync::Arc;
use tracing::info;

use crate::cloud::CloudServices;
use crate::config::{SimulationConfig, ValidatedConfig};
use crate::engine::{DeploymentEngine, DeploymentReport};
use crate::errors::ProvisioningResult;
use crate::graph::{DeploymentGraph, ProvisioningUnit, UnitId};
use crate::units::{
    GatewayHandle, GatewayProvisionerUnit, NetworkHandle, NetworkTopologyUnit, RouteBinderUnit,
    TestInstancesHandle, TestInstancesUnit, TunnelHandle, TunnelProvisionerUnit, GATEWAY_UNIT,
    NETWORK_UNIT, ROUTES_UNIT, TEST_INSTANCES_UNIT, TUNNEL_UNIT,
};

/// A validated deployment graph plus handles on its unit outputs
pub struct Deployment {
    config: Arc<ValidatedConfig>,
    graph: DeploymentGraph,
    order: Vec<UnitId>,
    pub network: NetworkHandle,
    pub tunnel: TunnelHandle,
    pub gateway: GatewayHandle,
    pub test_instances: Option<TestInstancesHandle>,
}

impl Deployment {
    /// Assemble and validate the graph
    pub fn build(config: &SimulationConfig, services: &CloudServices) -> ProvisioningResult<Self> {
        let config = Arc::new(config.validate()?);

        let network_id = UnitId::new(NETWORK_UNIT);
        let tunnel_id = UnitId::new(TUNNEL_UNIT);
        let gateway_id = UnitId::new(GATEWAY_UNIT);
        let routes_id = UnitId::new(ROUTES_UNIT);

        let network = NetworkHandle::new(network_id.clone());
        let tunnel = TunnelHandle::new(tunnel_id.clone());
        let gateway = GatewayHandle::new(gateway_id.clone());

        let mut graph = DeploymentGraph::new();

        graph.add_unit(ProvisioningUnit::new(
            network_id.clone(),
            Arc::new(NetworkTopologyUnit::new(
                config.clone(),
                services.provisioner.clone(),
            )),
        ))?;

        graph.add_unit(
            ProvisioningUnit::new(
                tunnel_id.clone(),
                Arc::new(TunnelProvisionerUnit::new(
                    config.clone(),
                    services.provisioner.clone(),
                    network.clone(),
                )),
            )
            .depends_on(network_id.clone()),
        )?;

        graph.add_unit(
            ProvisioningUnit::new(
                gateway_id.clone(),
                Arc::new(GatewayProvisionerUnit::new(
                    &gateway_id,
                    config.clone(),
                    services,
                    &network,
                    tunnel.clone(),
                )?),
            )
            .depends_on(tunnel_id.clone()),
        )?;

        graph.add_unit(
            ProvisioningUnit::new(
                routes_id.clone(),
                Arc::new(RouteBinderUnit::new(
                    config.clone(),
                    services.provisioner.clone(),
                    network.clone(),
                    tunnel.clone(),
                    gateway.clone(),
                )),
            )
            .depends_on(tunnel_id)
            .depends_on(gateway_id),
        )?;

        let test_instances = if config.test_instances {
            let id = UnitId::new(TEST_INSTANCES_UNIT);
            graph.add_unit(
                ProvisioningUnit::new(
                    id.clone(),
                    Arc::new(TestInstancesUnit::new(
                        config.clone(),
                        services.provisioner.clone(),
                        network.clone(),
                    )),
                )
                .depends_on(routes_id),
            )?;
            Some(TestInstancesHandle::new(id))
        } else {
            None
        };

        let order = graph.validate()?;
        info!(
            units = graph.len(),
            order = %order.iter().map(UnitId::as_str).collect::<Vec<_>>().join(" -> "),
            "Deployment graph assembled"
        );

        Ok(Self {
            config,
            graph,
            order,
            network,
            tunnel,
            gateway,
            test_instances,
        })
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn graph(&self) -> &DeploymentGraph {
        &self.graph
    }

    /// Order the engine will apply units in
    pub fn order(&self) -> &[UnitId] {
        &self.order
    }

    pub async fn apply(&self) -> ProvisioningResult<DeploymentReport> {
        DeploymentEngine::new().apply(&self.graph).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::SimulatedCloud;

    fn services() -> CloudServices {
        CloudServices::simulated(Arc::new(SimulatedCloud::new()))
    }

    #[test]
    fn test_default_order() {
        let deployment = Deployment::build(&SimulationConfig::default(), &services()).unwrap();
        let order: Vec<&str> = deployment.order().iter().map(UnitId::as_str).collect();
        assert_eq!(order, vec!["network", "tunnel", "gateway", "routes"]);
        assert!(deployment.test_instances.is_none());
    }

    #[test]
    fn test_optional_test_instances() {
        let config = SimulationConfig {
            test_instances: true,
            ..SimulationConfig::default()
        };
        let deployment = Deployment::build(&config, &services()).unwrap();
        assert_eq!(deployment.order().last().map(UnitId::as_str), Some("test-instances"));
    }

    #[test]
    fn test_invalid_config_builds_nothing() {
        let mut config = SimulationConfig::default();
        config.on_premises.asn = None;
        assert!(Deployment::build(&config, &services()).is_err());
    }
}
