// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deferred Values - handles to data that exists only after a unit runs
//!
//! A [`DeferredValue`] names a producing unit and a dot-delimited path into
//! that unit's eventual [`OutputDocument`]. Units build their parameters out
//! of these handles at graph-definition time; the deployment engine resolves
//! them against [`Outputs`] once every producer has completed.
//!
//! ```text
//! definition time                     apply time
//! ───────────────                     ──────────
//! DeferredValue(tunnel, "vpn_id")  ─>  Outputs[tunnel]["vpn_id"] = "vpn-0001"
//! ```
//!
//! Output documents are write-once: after a unit publishes its document no
//! later unit can replace or mutate it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::graph::UnitId;

/// Reference to a value that a specific upstream unit will produce
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeferredValue {
    producer: UnitId,
    path: String,
}

impl DeferredValue {
    pub fn new(producer: UnitId, path: impl Into<String>) -> Self {
        Self {
            producer,
            path: path.into(),
        }
    }

    /// Unit (or unit stage) whose output holds the value
    pub fn producer(&self) -> &UnitId {
        &self.producer
    }

    /// Dot-delimited key into the producer's output document
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}:{}}}", self.producer, self.path)
    }
}

/// Flat key → string document produced by a unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputDocument(BTreeMap<String, String>);

impl OutputDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Keep only keys starting with one of `prefixes`; no prefixes keeps everything
    pub fn filtered<S: AsRef<str>>(&self, prefixes: &[S]) -> OutputDocument {
        if prefixes.is_empty() {
            return self.clone();
        }

        self.0
            .iter()
            .filter(|(key, _)| prefixes.iter().any(|p| key.starts_with(p.as_ref())))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl FromIterator<(String, String)> for OutputDocument {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for OutputDocument {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Anything deferred values can be resolved against
pub trait ValueSource: Sync {
    /// Resolve a deferred value, failing if its producer has not completed
    fn resolve(&self, value: &DeferredValue) -> ProvisioningResult<String>;
}

/// Write-once store of published unit outputs
#[derive(Debug, Clone, Default, Serialize)]
pub struct Outputs {
    documents: BTreeMap<UnitId, OutputDocument>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a unit's output; each unit publishes exactly once
    pub fn publish(&mut self, unit: UnitId, document: OutputDocument) -> ProvisioningResult<()> {
        if self.documents.contains_key(&unit) {
            return Err(ProvisioningError::AlreadyPublished(unit.to_string()));
        }
        self.documents.insert(unit, document);
        Ok(())
    }

    pub fn document(&self, unit: &UnitId) -> Option<&OutputDocument> {
        self.documents.get(unit)
    }

    pub fn is_published(&self, unit: &UnitId) -> bool {
        self.documents.contains_key(unit)
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitId> {
        self.documents.keys()
    }
}

impl ValueSource for Outputs {
    fn resolve(&self, value: &DeferredValue) -> ProvisioningResult<String> {
        let document =
            self.document(value.producer())
                .ok_or_else(|| ProvisioningError::UnresolvedValue {
                    producer: value.producer().to_string(),
                    path: value.path().to_string(),
                })?;

        lookup(document, value)
    }
}

/// Unit-private documents layered over the shared store
///
/// Stages hold intermediate results inside one unit (for example the raw
/// tunnel configuration, key material included). They are never published to
/// [`Outputs`] and disappear when the overlay is dropped.
pub struct StagedOutputs<'a> {
    base: &'a dyn ValueSource,
    stages: BTreeMap<UnitId, OutputDocument>,
}

impl<'a> StagedOutputs<'a> {
    pub fn new(base: &'a dyn ValueSource) -> Self {
        Self {
            base,
            stages: BTreeMap::new(),
        }
    }

    /// Register a stage document; stages are write-once like published outputs
    pub fn stage(&mut self, stage: UnitId, document: OutputDocument) -> ProvisioningResult<()> {
        if self.stages.contains_key(&stage) {
            return Err(ProvisioningError::AlreadyPublished(stage.to_string()));
        }
        self.stages.insert(stage, document);
        Ok(())
    }
}

impl ValueSource for StagedOutputs<'_> {
    fn resolve(&self, value: &DeferredValue) -> ProvisioningResult<String> {
        match self.stages.get(value.producer()) {
            Some(document) => lookup(document, value),
            None => self.base.resolve(value),
        }
    }
}

fn lookup(document: &OutputDocument, value: &DeferredValue) -> ProvisioningResult<String> {
    document
        .get(value.path())
        .map(str::to_string)
        .ok_or_else(|| ProvisioningError::MissingOutput {
            producer: value.producer().to_string(),
            path: value.path().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pairs: &[(&str, &str)]) -> OutputDocument {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_before_publish_is_rejected() {
        let outputs = Outputs::new();
        let value = DeferredValue::new(UnitId::new("tunnel"), "vpn_connection_id");

        let err = outputs.resolve(&value).unwrap_err();
        assert!(matches!(err, ProvisioningError::UnresolvedValue { .. }));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_resolve_after_publish() {
        let mut outputs = Outputs::new();
        outputs
            .publish(UnitId::new("tunnel"), doc(&[("vpn_connection_id", "vpn-1")]))
            .unwrap();

        let value = DeferredValue::new(UnitId::new("tunnel"), "vpn_connection_id");
        assert_eq!(outputs.resolve(&value).unwrap(), "vpn-1");

        let missing = DeferredValue::new(UnitId::new("tunnel"), "nope");
        assert!(matches!(
            outputs.resolve(&missing),
            Err(ProvisioningError::MissingOutput { .. })
        ));
    }

    #[test]
    fn test_outputs_are_write_once() {
        let mut outputs = Outputs::new();
        outputs.publish(UnitId::new("a"), doc(&[("k", "1")])).unwrap();

        let err = outputs
            .publish(UnitId::new("a"), doc(&[("k", "2")]))
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::AlreadyPublished(_)));

        let value = DeferredValue::new(UnitId::new("a"), "k");
        assert_eq!(outputs.resolve(&value).unwrap(), "1");
    }

    #[test]
    fn test_staged_outputs_stay_private() {
        let mut outputs = Outputs::new();
        outputs.publish(UnitId::new("a"), doc(&[("k", "base")])).unwrap();

        let stage_id = UnitId::new("b").child("config");
        let mut staged = StagedOutputs::new(&outputs);
        staged.stage(stage_id.clone(), doc(&[("psk", "secret")])).unwrap();

        assert_eq!(
            staged.resolve(&DeferredValue::new(stage_id.clone(), "psk")).unwrap(),
            "secret"
        );
        assert_eq!(
            staged.resolve(&DeferredValue::new(UnitId::new("a"), "k")).unwrap(),
            "base"
        );
        drop(staged);

        assert!(!outputs.is_published(&stage_id));
    }

    #[test]
    fn test_filtered_document() {
        let d = doc(&[("a.b", "1"), ("a.c", "2"), ("x.y", "3")]);
        assert_eq!(d.filtered(&["a."]).len(), 2);
        assert_eq!(d.filtered::<&str>(&[]), d);
        assert!(d.filtered(&["zzz"]).is_empty());
    }

    #[test]
    fn test_display() {
        let value = DeferredValue::new(UnitId::new("gateway"), "primary_eni_id");
        assert_eq!(value.to_string(), "${gateway:primary_eni_id}");
    }
}
