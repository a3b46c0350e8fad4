// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory cloud used by the binary and the tests
//!
//! Issues deterministic physical identifiers (`vpc-00000001`), remembers every
//! resource it created, generates a customer-gateway configuration document
//! for each VPN connection and assigns a primary network attachment to every
//! instance it launches. Failures can be injected per resource kind or per
//! query.

use async_trait::async_trait;
use parking_lot::Mutex;
use quick_xml::escape::escape;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    AttachmentDiscovery, ConnectionConfigProvider, ProvisionedResource, ResourceKind,
    ResourceProvisioner, ResourceSpec,
};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::secrets::{InMemorySecretStore, SecretRef, SecretStore, SecretValue};

/// Where an injected failure fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Create(ResourceKind),
    DescribeConnection,
    DiscoverAttachments,
    SecretWrite,
}

#[derive(Debug, Clone)]
struct TunnelState {
    outside_address: String,
    cgw_inside: String,
    vgw_inside: String,
    pre_shared_key: String,
}

#[derive(Debug, Clone)]
struct ConnectionState {
    customer_gateway_id: String,
    transit_gateway_id: String,
    customer_address: String,
    customer_asn: String,
    amazon_asn: String,
    tunnels: [TunnelState; 2],
}

#[derive(Debug, Clone)]
struct CustomerGatewayState {
    address: String,
    asn: String,
}

#[derive(Debug, Default)]
struct State {
    counters: BTreeMap<&'static str, u32>,
    resources: Vec<(ResourceSpec, ProvisionedResource)>,
    customer_gateways: BTreeMap<String, CustomerGatewayState>,
    transit_gateway_asns: BTreeMap<String, String>,
    connections: BTreeMap<String, ConnectionState>,
    attachments: BTreeMap<String, Vec<String>>,
    failures: HashSet<FailurePoint>,
    describe_calls: u32,
    discovery_calls: u32,
}

impl State {
    fn next_id(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        *counter += 1;
        format!("{}-{:08x}", prefix, counter)
    }

    fn check(&self, point: FailurePoint) -> ProvisioningResult<()> {
        if self.failures.contains(&point) {
            return Err(ProvisioningError::ExternalQuery(format!(
                "injected failure at {:?}",
                point
            )));
        }
        Ok(())
    }
}

/// Simulated cloud provider
#[derive(Debug, Default)]
pub struct SimulatedCloud {
    state: Mutex<State>,
    secrets: InMemorySecretStore,
}

impl SimulatedCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given call fail until cleared
    pub fn fail(&self, point: FailurePoint) {
        self.state.lock().failures.insert(point);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Every resource created so far, in creation order
    pub fn resources(&self) -> Vec<(ResourceSpec, ProvisionedResource)> {
        self.state.lock().resources.clone()
    }

    /// Specs of created resources of one kind
    pub fn resources_of(&self, kind: ResourceKind) -> Vec<ResourceSpec> {
        self.state
            .lock()
            .resources
            .iter()
            .filter(|(spec, _)| spec.kind == kind)
            .map(|(spec, _)| spec.clone())
            .collect()
    }

    /// Number of connection configuration queries served
    pub fn describe_calls(&self) -> u32 {
        self.state.lock().describe_calls
    }

    /// Number of attachment discovery queries served
    pub fn discovery_calls(&self) -> u32 {
        self.state.lock().discovery_calls
    }

    /// Pin a tunnel's pre-shared key
    pub fn set_pre_shared_key(
        &self,
        connection_id: &str,
        tunnel: usize,
        psk: &str,
    ) -> ProvisioningResult<()> {
        let mut state = self.state.lock();
        let connection = state
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| not_found(connection_id))?;
        let tunnel = connection.tunnels.get_mut(tunnel).ok_or_else(|| {
            ProvisioningError::ExternalQuery(format!("tunnel {} does not exist", tunnel))
        })?;
        tunnel.pre_shared_key = psk.to_string();
        Ok(())
    }

    /// Issue fresh keys for both tunnels of a connection
    pub fn renegotiate(&self, connection_id: &str) -> ProvisioningResult<()> {
        let mut state = self.state.lock();
        let connection = state
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| not_found(connection_id))?;
        for tunnel in connection.tunnels.iter_mut() {
            tunnel.pre_shared_key = generate_psk();
        }
        info!(connection_id, "Renegotiated tunnel keys");
        Ok(())
    }

    /// The secret store backing [`SecretStore`] for this cloud
    pub fn secret_store(&self) -> &InMemorySecretStore {
        &self.secrets
    }

    fn record(state: &mut State, spec: &ResourceSpec) -> ProvisioningResult<ProvisionedResource> {
        let physical_id = state.next_id(spec.kind.id_prefix());
        let mut resource = ProvisionedResource::new(physical_id.clone());

        match spec.kind {
            ResourceKind::Vpc | ResourceKind::Subnet => {
                if let Some(cidr) = spec.property_str("cidrBlock") {
                    resource = resource.with_attribute("cidr_block", cidr);
                }
            }
            ResourceKind::ElasticIp => {
                let n = state.counters.get("eipalloc").copied().unwrap_or(1);
                resource = resource
                    .with_attribute("allocation_id", physical_id.clone())
                    .with_attribute("public_ip", format!("203.0.113.{}", n % 254 + 1));
            }
            ResourceKind::TransitGateway => {
                let asn =
                    property_text(spec, "amazonSideAsn").unwrap_or_else(|| "64512".to_string());
                state.transit_gateway_asns.insert(physical_id.clone(), asn);
            }
            ResourceKind::CustomerGateway => {
                let address = required(spec, "ipAddress")?;
                let asn = required(spec, "bgpAsn")?;
                state.customer_gateways.insert(
                    physical_id.clone(),
                    CustomerGatewayState { address, asn },
                );
            }
            ResourceKind::VpnConnection => {
                let cgw_id = required(spec, "customerGatewayId")?;
                let tgw_id = required(spec, "transitGatewayId")?;
                let cgw = state
                    .customer_gateways
                    .get(&cgw_id)
                    .cloned()
                    .ok_or_else(|| not_found(&cgw_id))?;
                let amazon_asn = state
                    .transit_gateway_asns
                    .get(&tgw_id)
                    .cloned()
                    .ok_or_else(|| not_found(&tgw_id))?;

                let n = state.connections.len() as u32;
                let tunnel = |t: u32| {
                    let block = 10 + (n * 2 + t) % 240;
                    TunnelState {
                        outside_address: format!("198.51.100.{}", (n * 2 + t) % 254 + 1),
                        cgw_inside: format!("169.254.{}.2", block),
                        vgw_inside: format!("169.254.{}.1", block),
                        pre_shared_key: generate_psk(),
                    }
                };

                state.connections.insert(
                    physical_id.clone(),
                    ConnectionState {
                        customer_gateway_id: cgw_id,
                        transit_gateway_id: tgw_id,
                        customer_address: cgw.address,
                        customer_asn: cgw.asn,
                        amazon_asn,
                        tunnels: [tunnel(0), tunnel(1)],
                    },
                );
            }
            ResourceKind::GatewayInstance | ResourceKind::Instance => {
                let eni = state.next_id("eni");
                state.attachments.insert(physical_id.clone(), vec![eni]);
            }
            _ => {}
        }

        state.resources.push((spec.clone(), resource.clone()));
        Ok(resource)
    }
}

/// String or numeric property rendered as text
fn property_text(spec: &ResourceSpec, key: &str) -> Option<String> {
    match spec.properties.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required(spec: &ResourceSpec, key: &str) -> ProvisioningResult<String> {
    property_text(spec, key).ok_or_else(|| {
        ProvisioningError::ExternalQuery(format!(
            "{} {} is missing property {}",
            spec.kind, spec.logical_id, key
        ))
    })
}

fn not_found(id: &str) -> ProvisioningError {
    ProvisioningError::ExternalQuery(format!("resource {} not found", id))
}

fn generate_psk() -> String {
    Uuid::now_v7().simple().to_string()
}

fn render_configuration(id: &str, connection: &ConnectionState) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<vpn_connection id=\"{}\">\n", escape(id)));
    xml.push_str(&format!(
        "  <customer_gateway_id>{}</customer_gateway_id>\n",
        escape(&connection.customer_gateway_id)
    ));
    xml.push_str(&format!(
        "  <transit_gateway_id>{}</transit_gateway_id>\n",
        escape(&connection.transit_gateway_id)
    ));
    xml.push_str("  <vpn_connection_type>ipsec.1</vpn_connection_type>\n");

    for tunnel in &connection.tunnels {
        xml.push_str(&format!(
            r#"  <ipsec_tunnel>
    <customer_gateway>
      <tunnel_outside_address><ip_address>{cgw_outside}</ip_address></tunnel_outside_address>
      <tunnel_inside_address>
        <ip_address>{cgw_inside}</ip_address>
        <network_mask>255.255.255.252</network_mask>
        <network_cidr>30</network_cidr>
      </tunnel_inside_address>
      <bgp><asn>{cgw_asn}</asn><hold_time>30</hold_time></bgp>
    </customer_gateway>
    <vpn_gateway>
      <tunnel_outside_address><ip_address>{vgw_outside}</ip_address></tunnel_outside_address>
      <tunnel_inside_address>
        <ip_address>{vgw_inside}</ip_address>
        <network_mask>255.255.255.252</network_mask>
        <network_cidr>30</network_cidr>
      </tunnel_inside_address>
      <bgp><asn>{amazon_asn}</asn><hold_time>30</hold_time></bgp>
    </vpn_gateway>
    <ike>
      <authentication_protocol>sha1</authentication_protocol>
      <encryption_protocol>aes-128-cbc</encryption_protocol>
      <lifetime>28800</lifetime>
      <perfect_forward_secrecy>group2</perfect_forward_secrecy>
      <mode>main</mode>
      <pre_shared_key>{psk}</pre_shared_key>
    </ike>
    <ipsec>
      <protocol>esp</protocol>
      <authentication_protocol>hmac-sha1-96</authentication_protocol>
      <encryption_protocol>aes-128-cbc</encryption_protocol>
      <lifetime>3600</lifetime>
      <perfect_forward_secrecy>group2</perfect_forward_secrecy>
      <mode>tunnel</mode>
      <clear_df_bit>true</clear_df_bit>
      <fragmentation_before_encryption>true</fragmentation_before_encryption>
      <tcp_mss_adjustment>1379</tcp_mss_adjustment>
      <dead_peer_detection><delay>10</delay><retries>3</retries></dead_peer_detection>
    </ipsec>
  </ipsec_tunnel>
"#,
            cgw_outside = escape(&connection.customer_address),
            cgw_inside = escape(&tunnel.cgw_inside),
            cgw_asn = connection.customer_asn,
            vgw_outside = escape(&tunnel.outside_address),
            vgw_inside = escape(&tunnel.vgw_inside),
            amazon_asn = connection.amazon_asn,
            psk = escape(&tunnel.pre_shared_key),
        ));
    }

    xml.push_str("</vpn_connection>\n");
    xml
}

#[async_trait]
impl ResourceProvisioner for SimulatedCloud {
    async fn create(&self, spec: &ResourceSpec) -> ProvisioningResult<ProvisionedResource> {
        let mut state = self.state.lock();
        state.check(FailurePoint::Create(spec.kind))?;
        let resource = Self::record(&mut state, spec)?;
        debug!(
            kind = %spec.kind,
            logical_id = %spec.logical_id,
            physical_id = %resource.physical_id,
            "Created resource"
        );
        Ok(resource)
    }
}

#[async_trait]
impl ConnectionConfigProvider for SimulatedCloud {
    async fn describe_connection(&self, connection_id: &str) -> ProvisioningResult<String> {
        let mut state = self.state.lock();
        state.describe_calls += 1;
        state.check(FailurePoint::DescribeConnection)?;
        let connection = state
            .connections
            .get(connection_id)
            .ok_or_else(|| not_found(connection_id))?;
        Ok(render_configuration(connection_id, connection))
    }
}

#[async_trait]
impl AttachmentDiscovery for SimulatedCloud {
    async fn attachments_for_instance(&self, instance_id: &str) -> ProvisioningResult<Vec<String>> {
        let mut state = self.state.lock();
        state.discovery_calls += 1;
        state.check(FailurePoint::DiscoverAttachments)?;
        Ok(state
            .attachments
            .get(instance_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SecretStore for SimulatedCloud {
    async fn put(&self, name: &str, value: SecretValue) -> ProvisioningResult<SecretRef> {
        self.state.lock().check(FailurePoint::SecretWrite)?;
        self.secrets.put(name, value).await
    }

    async fn grant_read(&self, secret: &SecretRef, principal: &str) -> ProvisioningResult<()> {
        self.secrets.grant_read(secret, principal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TunnelConfigResolver;
    use std::sync::Arc;

    async fn connection(cloud: &SimulatedCloud) -> String {
        let tgw = cloud
            .create(
                &ResourceSpec::new(ResourceKind::TransitGateway, "tgw")
                    .with("amazonSideAsn", 64512),
            )
            .await
            .unwrap();
        let cgw = cloud
            .create(
                &ResourceSpec::new(ResourceKind::CustomerGateway, "cgw")
                    .with("ipAddress", "203.0.113.9")
                    .with("bgpAsn", 65000),
            )
            .await
            .unwrap();
        cloud
            .create(
                &ResourceSpec::new(ResourceKind::VpnConnection, "vpn")
                    .with("customerGatewayId", cgw.physical_id)
                    .with("transitGatewayId", tgw.physical_id),
            )
            .await
            .unwrap()
            .physical_id
    }

    #[tokio::test]
    async fn test_ids_are_deterministic() {
        let cloud = SimulatedCloud::new();
        let a = cloud.create(&ResourceSpec::new(ResourceKind::Vpc, "a")).await.unwrap();
        let b = cloud.create(&ResourceSpec::new(ResourceKind::Vpc, "b")).await.unwrap();
        assert_eq!(a.physical_id, "vpc-00000001");
        assert_eq!(b.physical_id, "vpc-00000002");
    }

    #[tokio::test]
    async fn test_connection_configuration() {
        let cloud = SimulatedCloud::new();
        let vpn = connection(&cloud).await;
        cloud.set_pre_shared_key(&vpn, 0, "abc").unwrap();

        let xml = cloud.describe_connection(&vpn).await.unwrap();
        assert!(xml.contains("<pre_shared_key>abc</pre_shared_key>"));
        assert!(xml.contains("<ip_address>203.0.113.9</ip_address>"));
        assert_eq!(xml.matches("<ipsec_tunnel>").count(), 2);
        assert_eq!(cloud.describe_calls(), 1);
    }

    #[tokio::test]
    async fn test_configuration_escapes_markup() {
        let cloud = Arc::new(SimulatedCloud::new());
        let vpn = connection(&cloud).await;
        cloud.set_pre_shared_key(&vpn, 0, "a&b<c").unwrap();

        let xml = cloud.describe_connection(&vpn).await.unwrap();
        assert!(xml.contains("<pre_shared_key>a&amp;b&lt;c</pre_shared_key>"));

        let document = TunnelConfigResolver::new(cloud.clone())
            .tunnel_config(&vpn)
            .await
            .unwrap();
        assert_eq!(document.field(1, "ike", "pre_shared_key").unwrap(), "a&b<c");
    }

    #[tokio::test]
    async fn test_renegotiate_changes_keys() {
        let cloud = SimulatedCloud::new();
        let vpn = connection(&cloud).await;
        let before = cloud.describe_connection(&vpn).await.unwrap();
        cloud.renegotiate(&vpn).unwrap();
        let after = cloud.describe_connection(&vpn).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let cloud = SimulatedCloud::new();
        assert!(cloud.describe_connection("vpn-missing").await.is_err());
    }

    #[tokio::test]
    async fn test_instances_get_attachment() {
        let cloud = SimulatedCloud::new();
        let instance = cloud
            .create(&ResourceSpec::new(ResourceKind::GatewayInstance, "gw"))
            .await
            .unwrap();
        let attachments = cloud.attachments_for_instance(&instance.physical_id).await.unwrap();
        assert_eq!(attachments, vec!["eni-00000001".to_string()]);
        assert!(cloud.attachments_for_instance("i-unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let cloud = SimulatedCloud::new();
        cloud.fail(FailurePoint::Create(ResourceKind::Vpc));
        assert!(cloud.create(&ResourceSpec::new(ResourceKind::Vpc, "a")).await.is_err());
        assert!(cloud.create(&ResourceSpec::new(ResourceKind::Subnet, "s")).await.is_ok());

        cloud.clear_failures();
        assert!(cloud.create(&ResourceSpec::new(ResourceKind::Vpc, "a")).await.is_ok());
    }
}
