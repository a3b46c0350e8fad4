// Copyright (c) 2025 - Cowboy AI, Inc.
//! Custom-resource lifecycle protocol
//!
//! Externally resolved units receive a lifecycle event with a property bag
//! and answer with a data payload. Field names follow the deployment
//! engine's PascalCase wire format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::deferred::OutputDocument;
use crate::errors::{ProvisioningError, ProvisioningResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// Lifecycle event delivered to a handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceEvent {
    pub request_type: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: Map<String, Value>,
}

impl CustomResourceEvent {
    pub fn create(properties: Map<String, Value>) -> Self {
        Self {
            request_type: RequestType::Create,
            physical_resource_id: None,
            resource_properties: properties,
        }
    }

    pub fn delete(physical_resource_id: impl Into<String>) -> Self {
        Self {
            request_type: RequestType::Delete,
            physical_resource_id: Some(physical_resource_id.into()),
            resource_properties: Map::new(),
        }
    }

    /// A property that must be a non-empty string
    pub fn required_str(&self, name: &str) -> ProvisioningResult<&str> {
        match self.resource_properties.get(name) {
            None | Some(Value::Null) => Err(ProvisioningError::MissingProperty(name.to_string())),
            Some(Value::String(s)) if s.is_empty() => {
                Err(ProvisioningError::MissingProperty(name.to_string()))
            }
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(ProvisioningError::InvalidProperty {
                name: name.to_string(),
                reason: "expected a string".to_string(),
            }),
        }
    }

    /// An optional list of strings; absent or null yields `None`
    pub fn optional_string_list(&self, name: &str) -> ProvisioningResult<Option<Vec<String>>> {
        let invalid = || ProvisioningError::InvalidProperty {
            name: name.to_string(),
            reason: "expected an array of strings".to_string(),
        };

        match self.resource_properties.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
                .collect::<ProvisioningResult<Vec<_>>>()
                .map(Some),
            Some(_) => Err(invalid()),
        }
    }
}

/// Handler answer; `Data` is absent for deletes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<OutputDocument>,
}

impl CustomResourceResponse {
    pub fn acknowledge(physical_resource_id: Option<String>) -> Self {
        Self {
            physical_resource_id,
            data: None,
        }
    }

    pub fn with_data(data: OutputDocument) -> Self {
        Self {
            physical_resource_id: None,
            data: Some(data),
        }
    }
}

#[async_trait]
pub trait CustomResourceHandler: Send + Sync {
    async fn handle(
        &self,
        event: &CustomResourceEvent,
    ) -> ProvisioningResult<CustomResourceResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(raw: Value) -> CustomResourceEvent {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_wire_format() {
        let e = event(json!({
            "RequestType": "Create",
            "ResourceProperties": { "vpnId": "vpn-1", "outputPaths": ["a", "b"] }
        }));
        assert_eq!(e.request_type, RequestType::Create);
        assert_eq!(e.required_str("vpnId").unwrap(), "vpn-1");
        assert_eq!(
            e.optional_string_list("outputPaths").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );

        let response = CustomResourceResponse::acknowledge(Some("id-1".to_string()));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "PhysicalResourceId": "id-1" })
        );
    }

    #[test]
    fn test_property_errors() {
        let e = event(json!({
            "RequestType": "Update",
            "ResourceProperties": { "vpnId": "", "outputPaths": "a", "n": 3 }
        }));
        assert!(matches!(e.required_str("vpnId"), Err(ProvisioningError::MissingProperty(_))));
        assert!(matches!(e.required_str("other"), Err(ProvisioningError::MissingProperty(_))));
        assert!(matches!(e.required_str("n"), Err(ProvisioningError::InvalidProperty { .. })));
        assert!(e.optional_string_list("outputPaths").is_err());
        assert_eq!(e.optional_string_list("missing").unwrap(), None);
    }
}
