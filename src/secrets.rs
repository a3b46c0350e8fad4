// Copyright (c) 2025 - Cowboy AI, Inc.
//! Secret store interface
//!
//! Key material extracted from a tunnel configuration is written here once
//! and referenced by name afterwards. A [`SecretRef`] never carries the
//! value, and [`SecretValue`] never prints it.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

use crate::errors::{ProvisioningError, ProvisioningResult};

/// Sensitive string; `Debug` is redacted and there is no `Display`
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the plaintext
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

/// Opaque reference to a stored secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SecretRef {
    name: String,
}

impl SecretRef {
    /// Refer to a secret by name; reading it still requires a grant
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Write interface of the secret store
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store a new secret; returns its reference, never the value
    async fn put(&self, name: &str, value: SecretValue) -> ProvisioningResult<SecretRef>;

    /// Allow a principal to read one secret
    async fn grant_read(&self, secret: &SecretRef, principal: &str) -> ProvisioningResult<()>;
}

#[derive(Debug)]
struct Entry {
    value: SecretValue,
    readers: BTreeSet<String>,
}

/// Secret store held in process memory
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a secret as `principal`; only granted principals succeed
    pub fn read(&self, secret: &SecretRef, principal: &str) -> ProvisioningResult<SecretValue> {
        let entries = self.entries.read();
        let entry = entries
            .get(secret.name())
            .ok_or_else(|| ProvisioningError::Secret(format!("secret {} not found", secret)))?;

        if !entry.readers.contains(principal) {
            return Err(ProvisioningError::Secret(format!(
                "{} may not read {}",
                principal, secret
            )));
        }
        Ok(entry.value.clone())
    }

    /// Principals allowed to read a secret
    pub fn readers(&self, secret: &SecretRef) -> Vec<String> {
        self.entries
            .read()
            .get(secret.name())
            .map(|e| e.readers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn put(&self, name: &str, value: SecretValue) -> ProvisioningResult<SecretRef> {
        if name.trim().is_empty() {
            return Err(ProvisioningError::Secret("secret name must not be empty".to_string()));
        }

        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(ProvisioningError::Secret(format!("secret {} already exists", name)));
        }
        entries.insert(
            name.to_string(),
            Entry {
                value,
                readers: BTreeSet::new(),
            },
        );
        debug!(secret = name, "Stored secret");

        Ok(SecretRef::new(name))
    }

    async fn grant_read(&self, secret: &SecretRef, principal: &str) -> ProvisioningResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(secret.name())
            .ok_or_else(|| ProvisioningError::Secret(format!("secret {} not found", secret)))?;
        entry.readers.insert(principal.to_string());
        debug!(secret = %secret, principal, "Granted read access");
        Ok(())
    }
}
