// Copyright (c) 2025 - Cowboy AI, Inc.
//! Parameter Binding
//!
//! Downstream units describe their parameters as [`Binding`]s: literals known
//! at definition time, [`DeferredValue`]s produced by an upstream unit, or a
//! concatenation of both. A [`ParameterSet`] is resolved in one pass once
//! every producer it mentions has completed.
//!
//! ```text
//! "pTunnel1CgwInsideIpAddress" = Concat[
//!     Deferred(gateway/tunnel-config: ...customer_gateway.tunnel_inside_address.ip_address),
//!     Literal("/"),
//!     Deferred(gateway/tunnel-config: ...customer_gateway.tunnel_inside_address.network_cidr),
//! ]
//! ```

pub mod tunnel;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::deferred::{DeferredValue, ValueSource};
use crate::errors::ProvisioningResult;

pub use tunnel::{
    config_key, output_paths, TunnelConfig, TunnelConfigDocument, TunnelIndex, TunnelSection,
};

/// Programmer errors in binding lookups
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),
}

/// A parameter value that may not exist yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Binding {
    Literal(String),
    Deferred(DeferredValue),
    Concat(Vec<Binding>),
}

impl Binding {
    pub fn literal(value: impl fmt::Display) -> Self {
        Binding::Literal(value.to_string())
    }

    pub fn concat(parts: impl IntoIterator<Item = Binding>) -> Self {
        Binding::Concat(parts.into_iter().collect())
    }

    /// Every deferred value this binding reads
    pub fn deferred_values(&self) -> Vec<&DeferredValue> {
        match self {
            Binding::Literal(_) => Vec::new(),
            Binding::Deferred(value) => vec![value],
            Binding::Concat(parts) => parts.iter().flat_map(Binding::deferred_values).collect(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.deferred_values().is_empty()
    }

    /// Produce the concrete string
    pub fn resolve(&self, source: &dyn ValueSource) -> ProvisioningResult<String> {
        match self {
            Binding::Literal(value) => Ok(value.clone()),
            Binding::Deferred(value) => source.resolve(value),
            Binding::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&part.resolve(source)?);
                }
                Ok(out)
            }
        }
    }
}

impl From<DeferredValue> for Binding {
    fn from(value: DeferredValue) -> Self {
        Binding::Deferred(value)
    }
}

impl From<&str> for Binding {
    fn from(value: &str) -> Self {
        Binding::Literal(value.to_string())
    }
}

impl From<String> for Binding {
    fn from(value: String) -> Self {
        Binding::Literal(value)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Literal(value) => f.write_str(value),
            Binding::Deferred(value) => write!(f, "{}", value),
            Binding::Concat(parts) => parts.iter().try_for_each(|p| write!(f, "{}", p)),
        }
    }
}

/// Named late-bound parameters of a unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, Binding>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, binding: impl Into<Binding>) {
        self.0.insert(name.into(), binding.into());
    }

    pub fn with(mut self, name: impl Into<String>, binding: impl Into<Binding>) -> Self {
        self.insert(name, binding);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Distinct deferred values read by any parameter
    pub fn deferred_values(&self) -> Vec<DeferredValue> {
        let mut values: Vec<DeferredValue> = self
            .0
            .values()
            .flat_map(Binding::deferred_values)
            .cloned()
            .collect();
        values.sort();
        values.dedup();
        values
    }

    /// Resolve every parameter; the first unresolved value fails the set
    pub fn resolve(
        &self,
        source: &dyn ValueSource,
    ) -> ProvisioningResult<BTreeMap<String, String>> {
        self.0
            .iter()
            .map(|(name, binding)| Ok((name.clone(), binding.resolve(source)?)))
            .collect()
    }
}
