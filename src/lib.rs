// Copyright (c) 2025 - Cowboy AI, Inc.
//! Simulated site-to-site VPN environment
//!
//! Provisions two networks, a transit hub, a software VPN gateway and the
//! routes joining them, as a graph of provisioning units applied in
//! dependency order. Later units consume values that only exist once an
//! earlier unit has run, such as a pre-shared key negotiated by the VPN
//! connection or the network attachment of a booted instance.
//!
//! - [`graph`] and [`engine`] order and apply units
//! - [`deferred`] carries values between units
//! - [`resolver`] extracts tunnel configuration from the connection's XML
//! - [`binding`] maps tunnel lookups onto flattened configuration keys
//! - [`units`] and [`deployment`] describe the environment itself
//! - [`cloud`] and [`secrets`] are the external collaborators

pub mod binding;
pub mod cloud;
pub mod config;
pub mod deferred;
pub mod deployment;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod resolver;
pub mod secrets;
pub mod units;

// Re-export commonly used types
pub use binding::{Binding, BindingError, ParameterSet, TunnelConfig, TunnelConfigDocument};
pub use cloud::{CloudServices, FailurePoint, SimulatedCloud};
pub use config::{SimulationConfig, ValidatedConfig};
pub use deferred::{DeferredValue, OutputDocument, Outputs, ValueSource};
pub use deployment::Deployment;
pub use engine::{DeploymentEngine, DeploymentReport, UnitStatus};
pub use errors::{ProvisioningError, ProvisioningResult};
pub use graph::{DeploymentGraph, GraphError, ProvisioningUnit, UnitId, UnitPayload};
pub use resolver::TunnelConfigResolver;
