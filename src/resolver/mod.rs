// Copyright (c) 2025 - Cowboy AI, Inc.
//! External configuration resolver
//!
//! Fetches the negotiated configuration of a VPN connection, parses the XML,
//! flattens it to dot-path keys and keeps the keys matching an allow-list of
//! prefixes.
//!
//! Every call performs exactly one query. Nothing is cached between calls:
//! if the connection re-negotiates its keys, the next call sees the new ones.

pub mod custom_resource;
pub mod flatten;
pub mod xml;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::binding::{output_paths, TunnelConfigDocument};
use crate::cloud::ConnectionConfigProvider;
use crate::deferred::OutputDocument;
use crate::errors::{ProvisioningError, ProvisioningResult};

pub use custom_resource::{
    CustomResourceEvent, CustomResourceHandler, CustomResourceResponse, RequestType,
};
pub use flatten::{flatten, unflatten};
pub use xml::parse_document;

/// Property carrying the connection identifier
pub const VPN_ID_PROPERTY: &str = "vpnId";

/// Property carrying the optional prefix allow-list
pub const OUTPUT_PATHS_PROPERTY: &str = "outputPaths";

/// Resolves tunnel configuration documents from a connection provider
#[derive(Clone)]
pub struct TunnelConfigResolver {
    provider: Arc<dyn ConnectionConfigProvider>,
}

impl TunnelConfigResolver {
    pub fn new(provider: Arc<dyn ConnectionConfigProvider>) -> Self {
        Self { provider }
    }

    /// Query, parse, flatten and filter one connection's configuration
    ///
    /// `output_paths` of `None` or an empty list keeps every key.
    pub async fn resolve(
        &self,
        connection_id: &str,
        output_paths: Option<&[String]>,
    ) -> ProvisioningResult<OutputDocument> {
        if connection_id.trim().is_empty() {
            return Err(ProvisioningError::MissingProperty(
                VPN_ID_PROPERTY.to_string(),
            ));
        }

        info!(connection_id, "Describing VPN connection");
        let xml = self.provider.describe_connection(connection_id).await?;
        let tree = parse_document(&xml)?;
        let flat = flatten(&tree);

        let document = match output_paths {
            Some(prefixes) => flat.filtered(prefixes),
            None => flat,
        };
        debug!(connection_id, keys = document.len(), "Resolved connection configuration");
        Ok(document)
    }

    /// Resolve the sections of both tunnels
    pub async fn tunnel_config(
        &self,
        connection_id: &str,
    ) -> ProvisioningResult<TunnelConfigDocument> {
        let paths = output_paths();
        Ok(self.resolve(connection_id, Some(&paths)).await?.into())
    }
}

impl std::fmt::Debug for TunnelConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelConfigResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl CustomResourceHandler for TunnelConfigResolver {
    async fn handle(
        &self,
        event: &CustomResourceEvent,
    ) -> ProvisioningResult<CustomResourceResponse> {
        if event.request_type == RequestType::Delete {
            debug!(physical_resource_id = ?event.physical_resource_id, "Ignoring delete");
            return Ok(CustomResourceResponse::acknowledge(
                event.physical_resource_id.clone(),
            ));
        }

        let connection_id = event.required_str(VPN_ID_PROPERTY)?;
        let paths = event.optional_string_list(OUTPUT_PATHS_PROPERTY)?;
        let data = self.resolve(connection_id, paths.as_deref()).await?;

        let mut response = CustomResourceResponse::with_data(data);
        response.physical_resource_id = event.physical_resource_id.clone();
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::config_key;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Serves a fixed document and counts queries
    struct Fixed {
        xml: Mutex<String>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ConnectionConfigProvider for Fixed {
        async fn describe_connection(&self, _id: &str) -> ProvisioningResult<String> {
            *self.calls.lock() += 1;
            Ok(self.xml.lock().clone())
        }
    }

    fn fixed(psk: &str) -> Arc<Fixed> {
        Arc::new(Fixed {
            xml: Mutex::new(document(psk)),
            calls: Mutex::new(0),
        })
    }

    fn document(psk: &str) -> String {
        format!(
            "<vpn_connection id=\"vpn-1\">\
               <ipsec_tunnel><ike><pre_shared_key>{psk}</pre_shared_key></ike>\
                 <vpn_gateway><bgp><asn>64512</asn></bgp></vpn_gateway></ipsec_tunnel>\
               <ipsec_tunnel><ike><pre_shared_key>other</pre_shared_key></ike></ipsec_tunnel>\
             </vpn_connection>"
        )
    }

    #[tokio::test]
    async fn test_resolve_and_filter() {
        let provider = fixed("abc");
        let resolver = TunnelConfigResolver::new(provider.clone());

        let all = resolver.resolve("vpn-1", None).await.unwrap();
        assert_eq!(all.get("vpn_connection.$.id"), Some("vpn-1"));
        assert_eq!(
            all.get(&config_key(1, "ike", "pre_shared_key").unwrap()),
            Some("abc")
        );

        let prefixes = vec!["vpn_connection.ipsec_tunnel.0.ike".to_string()];
        let filtered = resolver.resolve("vpn-1", Some(&prefixes)).await.unwrap();
        assert_eq!(filtered.len(), 1);

        let empty: Vec<String> = Vec::new();
        assert_eq!(resolver.resolve("vpn-1", Some(&empty)).await.unwrap(), all);
        assert_eq!(*provider.calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_no_caching_between_calls() {
        let provider = fixed("abc");
        let resolver = TunnelConfigResolver::new(provider.clone());
        let key = config_key(1, "ike", "pre_shared_key").unwrap();

        let first = resolver.resolve("vpn-1", None).await.unwrap();
        *provider.xml.lock() = document("xyz");
        let second = resolver.resolve("vpn-1", None).await.unwrap();

        assert_eq!(first.get(&key), Some("abc"));
        assert_eq!(second.get(&key), Some("xyz"));
    }

    #[tokio::test]
    async fn test_handler_protocol() {
        let provider = fixed("abc");
        let resolver = TunnelConfigResolver::new(provider.clone());

        let delete = CustomResourceEvent::delete("res-1");
        let response = resolver.handle(&delete).await.unwrap();
        assert_eq!(response.physical_resource_id.as_deref(), Some("res-1"));
        assert!(response.data.is_none());
        assert_eq!(*provider.calls.lock(), 0);

        let missing = CustomResourceEvent::create(serde_json::Map::new());
        assert!(matches!(
            resolver.handle(&missing).await,
            Err(ProvisioningError::MissingProperty(_))
        ));

        let create: CustomResourceEvent = serde_json::from_value(json!({
            "RequestType": "Create",
            "ResourceProperties": {
                "vpnId": "vpn-1",
                "outputPaths": ["vpn_connection.ipsec_tunnel.1"]
            }
        }))
        .unwrap();
        let data = resolver.handle(&create).await.unwrap().data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(
            data.get("vpn_connection.ipsec_tunnel.1.ike.pre_shared_key"),
            Some("other")
        );
    }

    #[tokio::test]
    async fn test_update_resolves_like_create() {
        let provider = fixed("abc");
        let resolver = TunnelConfigResolver::new(provider.clone());

        let update: CustomResourceEvent = serde_json::from_value(json!({
            "RequestType": "Update",
            "PhysicalResourceId": "res-1",
            "ResourceProperties": {
                "vpnId": "vpn-1",
                "outputPaths": ["vpn_connection.ipsec_tunnel.0.ike"]
            }
        }))
        .unwrap();
        assert_eq!(update.request_type, RequestType::Update);

        *provider.xml.lock() = document("rotated");
        let response = resolver.handle(&update).await.unwrap();

        assert_eq!(response.physical_resource_id.as_deref(), Some("res-1"));
        let data = response.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(
            data.get(&config_key(1, "ike", "pre_shared_key").unwrap()),
            Some("rotated")
        );
        assert_eq!(*provider.calls.lock(), 1);
    }
}
