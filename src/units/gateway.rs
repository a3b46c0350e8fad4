// Copyright (c) 2025 - Cowboy AI, Inc.
//! Gateway Provisioner
//!
//! Applied in four steps:
//!
//! 1. Resolve the VPN connection's tunnel configuration through the
//!    custom-resource protocol and stage it privately as
//!    `gateway/tunnel-config`
//! 2. Store each tunnel's pre-shared key in the secret store
//! 3. Resolve the template parameters against the stage and launch the
//!    gateway instance, then grant it read access to both secrets
//! 4. Discover the instance's primary network attachment
//!
//! Only identifiers and secret names are published. Key material stays in
//! the stage, which is dropped when the unit finishes.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::network::NetworkHandle;
use super::tunnel::TunnelHandle;
use crate::binding::{output_paths, Binding, ParameterSet, TunnelConfig, TunnelIndex};
use crate::cloud::{
    AttachmentDiscovery, CloudServices, ResourceKind, ResourceProvisioner, ResourceSpec,
};
use crate::config::ValidatedConfig;
use crate::deferred::{DeferredValue, OutputDocument, ValueSource};
use crate::domain::Site;
use crate::engine::UnitContext;
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::graph::{UnitId, UnitPayload};
use crate::resolver::{
    CustomResourceEvent, CustomResourceHandler, TunnelConfigResolver, OUTPUT_PATHS_PROPERTY,
    VPN_ID_PROPERTY,
};
use crate::secrets::{SecretRef, SecretStore, SecretValue};

/// Private stage holding the resolved tunnel configuration
pub const TUNNEL_CONFIG_STAGE: &str = "tunnel-config";

/// Authentication mode passed to the gateway software
pub const AUTH_TYPE: &str = "psk";

/// Output keys of the gateway unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayHandle {
    unit: UnitId,
}

impl GatewayHandle {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn instance_id(&self) -> DeferredValue {
        DeferredValue::new(self.unit.clone(), "instance_id")
    }

    pub fn primary_attachment_id(&self) -> DeferredValue {
        DeferredValue::new(self.unit.clone(), "primary_attachment_id")
    }

    pub fn psk_secret_name(&self, tunnel: TunnelIndex) -> DeferredValue {
        DeferredValue::new(self.unit.clone(), format!("{}.psk_secret_name", tunnel))
    }
}

pub struct GatewayProvisionerUnit {
    config: Arc<ValidatedConfig>,
    provisioner: Arc<dyn ResourceProvisioner>,
    attachments: Arc<dyn AttachmentDiscovery>,
    secrets: Arc<dyn SecretStore>,
    resolver: TunnelConfigResolver,
    tunnel: TunnelHandle,
    tunnel_config: TunnelConfig,
    parameters: ParameterSet,
}

impl GatewayProvisionerUnit {
    pub fn new(
        unit: &UnitId,
        config: Arc<ValidatedConfig>,
        services: &CloudServices,
        network: &NetworkHandle,
        tunnel: TunnelHandle,
    ) -> ProvisioningResult<Self> {
        let tunnel_config = TunnelConfig::new(unit.child(TUNNEL_CONFIG_STAGE));
        let parameters = template_parameters(&config, &tunnel_config, network, &tunnel)?;

        Ok(Self {
            provisioner: services.provisioner.clone(),
            attachments: services.attachments.clone(),
            secrets: services.secrets.clone(),
            resolver: TunnelConfigResolver::new(services.connections.clone()),
            config,
            tunnel,
            tunnel_config,
            parameters,
        })
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    fn secret_name(&self, tunnel: TunnelIndex) -> String {
        psk_secret_name(&self.config, tunnel)
    }

    /// Step 1: one resolver call, answered through the lifecycle protocol
    async fn resolve_tunnel_config(
        &self,
        connection_id: String,
    ) -> ProvisioningResult<OutputDocument> {
        let mut properties = Map::new();
        properties.insert(VPN_ID_PROPERTY.to_string(), Value::String(connection_id));
        properties.insert(OUTPUT_PATHS_PROPERTY.to_string(), json!(output_paths()));

        let response = self
            .resolver
            .handle(&CustomResourceEvent::create(properties))
            .await?;
        response.data.ok_or_else(|| {
            ProvisioningError::ExternalQuery(
                "tunnel configuration resolver returned no data".to_string(),
            )
        })
    }

    /// Step 4: first attachment reported for the instance
    async fn primary_attachment(&self, instance_id: &str) -> ProvisioningResult<String> {
        let attachments = self.attachments.attachments_for_instance(instance_id).await?;
        attachments.into_iter().next().ok_or_else(|| {
            ProvisioningError::ExternalQuery(format!(
                "instance {} has no network attachment",
                instance_id
            ))
        })
    }
}

/// Secret name of one tunnel's pre-shared key
pub fn psk_secret_name(config: &ValidatedConfig, tunnel: TunnelIndex) -> String {
    config.resource_name(&format!("{}-psk", tunnel))
}

/// Parameters of the gateway instance template
fn template_parameters(
    config: &ValidatedConfig,
    tunnel_config: &TunnelConfig,
    network: &NetworkHandle,
    tunnel: &TunnelHandle,
) -> ProvisioningResult<ParameterSet> {
    let mut parameters = ParameterSet::new()
        .with("pAuthType", AUTH_TYPE)
        .with("pEipAllocationId", tunnel.eip_allocation_id())
        .with("pLocalBgpAsn", Binding::literal(config.on_premises.asn))
        .with("pVpcId", network.vpc_id(Site::OnPremises))
        .with("pVpcCidr", network.vpc_cidr(Site::OnPremises))
        .with("pSubnetId", network.public_subnet_id(Site::OnPremises, 0));

    for index in TunnelIndex::ALL {
        let n = index.number();
        let name = |suffix: &str| format!("pTunnel{}{}", n, suffix);

        parameters.insert(name("PskSecretName"), psk_secret_name(config, index));
        parameters.insert(
            name("VgwOutsideIpAddress"),
            tunnel_config.get_config(n, "vgw", "tunnel_outside_address.ip_address")?,
        );
        parameters.insert(name("CgwInsideIpAddress"), tunnel_config.inside_cidr(n, "cgw")?);
        parameters.insert(name("VgwInsideIpAddress"), tunnel_config.inside_cidr(n, "vgw")?);
        parameters.insert(name("VgwBgpAsn"), tunnel_config.get_config(n, "vgw", "bgp.asn")?);
        parameters.insert(
            name("BgpNeighborIpAddress"),
            tunnel_config.get_config(n, "vgw", "tunnel_inside_address.ip_address")?,
        );
    }

    Ok(parameters)
}

#[async_trait]
impl UnitPayload for GatewayProvisionerUnit {
    fn consumes(&self) -> Vec<DeferredValue> {
        let mut values = self.parameters.deferred_values();
        values.push(self.tunnel.vpn_connection_id());
        values
    }

    async fn apply(&self, ctx: &UnitContext<'_>) -> ProvisioningResult<OutputDocument> {
        let connection_id = ctx.resolve(&self.tunnel.vpn_connection_id())?;
        let document = self.resolve_tunnel_config(connection_id).await?;
        debug!(unit = %ctx.unit_id(), keys = document.len(), "Tunnel configuration staged");

        let (keys, parameters) = {
            let mut staged = ctx.staged();
            staged.stage(self.tunnel_config.producer().clone(), document)?;

            let mut keys = Vec::with_capacity(TunnelIndex::ALL.len());
            for index in TunnelIndex::ALL {
                let psk = self
                    .tunnel_config
                    .get_config(index.number(), "ike", "pre_shared_key")?;
                keys.push((index, staged.resolve(&psk)?));
            }
            (keys, self.parameters.resolve(&staged)?)
        };

        let mut secrets: BTreeMap<TunnelIndex, SecretRef> = BTreeMap::new();
        for (index, psk) in keys {
            let value = SecretValue::new(json!({ "psk": psk }).to_string());
            let secret = self.secrets.put(&self.secret_name(index), value).await?;
            secrets.insert(index, secret);
        }

        let instance = self
            .provisioner
            .create(
                &ResourceSpec::new(ResourceKind::GatewayInstance, "gateway-instance")
                    .with("name", self.config.resource_name("vpn-gateway"))
                    .with("parameters", json!(parameters)),
            )
            .await?;

        for secret in secrets.values() {
            self.secrets.grant_read(secret, &instance.physical_id).await?;
        }

        let attachment_id = self.primary_attachment(&instance.physical_id).await?;

        info!(
            unit = %ctx.unit_id(),
            instance_id = %instance.physical_id,
            primary_attachment_id = %attachment_id,
            "Gateway instance launched"
        );

        let mut out = OutputDocument::new();
        for (index, secret) in &secrets {
            out.insert(format!("{}.psk_secret_name", index), secret.name());
        }
        out.insert("instance_id", instance.physical_id);
        out.insert("primary_attachment_id", attachment_id);
        Ok(out)
    }
}
