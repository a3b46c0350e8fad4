// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for provisioning operations

use thiserror::Error;

use crate::binding::BindingError;
use crate::domain::NetworkError;
use crate::graph::GraphError;

/// Errors that can occur while assembling or applying a deployment
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Deployment graph is malformed (cycle, unknown unit, missing edge)
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Tunnel configuration lookup with an illegal argument
    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    /// Invalid network value
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Required custom resource property was not supplied
    #[error("Missing required property: {0}")]
    MissingProperty(String),

    /// Custom resource property has the wrong shape
    #[error("Invalid property {name}: {reason}")]
    InvalidProperty { name: String, reason: String },

    /// A deferred value was read before its producer completed
    #[error("Deferred value {producer}:{path} is not resolved")]
    UnresolvedValue { producer: String, path: String },

    /// Producer completed but never emitted the requested path
    #[error("Unit {producer} produced no output at {path}")]
    MissingOutput { producer: String, path: String },

    /// A unit output document was published twice
    #[error("Output of unit {0} is already published")]
    AlreadyPublished(String),

    /// Query to an external provider failed
    #[error("External query failed: {0}")]
    ExternalQuery(String),

    /// Connection configuration document could not be parsed
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Secret store write failed
    #[error("Secret store error: {0}")]
    Secret(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for provisioning operations
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

impl ProvisioningError {
    /// Contract errors are programmer mistakes and are never worth retrying
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ProvisioningError::Binding(_)
                | ProvisioningError::MissingProperty(_)
                | ProvisioningError::InvalidProperty { .. }
                | ProvisioningError::UnresolvedValue { .. }
                | ProvisioningError::MissingOutput { .. }
                | ProvisioningError::AlreadyPublished(_)
                | ProvisioningError::Graph(_)
        )
    }
}

impl From<serde_json::Error> for ProvisioningError {
    fn from(err: serde_json::Error) -> Self {
        ProvisioningError::Serialization(err.to_string())
    }
}

impl From<quick_xml::Error> for ProvisioningError {
    fn from(err: quick_xml::Error) -> Self {
        ProvisioningError::XmlParse(err.to_string())
    }
}
