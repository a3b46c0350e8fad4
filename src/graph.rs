// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment Graph - provisioning units and their ordering
//!
//! A deployment is a DAG of [`ProvisioningUnit`]s. Each unit declares its
//! predecessors explicitly; the graph never infers edges from the deferred
//! values a unit consumes. Instead [`DeploymentGraph::validate`] rejects any
//! unit that consumes a value from a producer it cannot reach through its
//! predecessor edges.
//!
//! ```text
//! network ──> tunnel ──> gateway ──> routes
//!                │                     ▲
//!                └─────────────────────┘
//! ```
//!
//! Ordering uses Kahn's algorithm with ties broken by insertion order, so a
//! fixed graph always yields the same deployment order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::deferred::{DeferredValue, OutputDocument};
use crate::engine::UnitContext;
use crate::errors::ProvisioningResult;

/// Graph construction and validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unit {0} is already defined")]
    DuplicateUnit(UnitId),

    #[error("Unit {0} is not defined")]
    UnknownUnit(UnitId),

    #[error("Unit id {0} names a stage, not a unit")]
    InvalidUnitId(UnitId),

    #[error("Unit {unit} declares unknown predecessor {predecessor}")]
    UnknownPredecessor { unit: UnitId, predecessor: UnitId },

    #[error("Dependency cycle between units: {}", format_units(.0))]
    Cycle(Vec<UnitId>),

    #[error("Unit {consumer} consumes {value} without a dependency on {producer}")]
    MissingDependency {
        consumer: UnitId,
        producer: UnitId,
        value: String,
    },

    #[error("Unit {consumer} consumes private stage {stage} of another unit")]
    PrivateStage { consumer: UnitId, stage: UnitId },

    #[error("Unit {0} consumes its own output")]
    SelfReference(UnitId),
}

fn format_units(units: &[UnitId]) -> String {
    units
        .iter()
        .map(UnitId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Identifier of a provisioning unit, or of a private stage inside one
///
/// Stages are written `unit/stage`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of a private stage within this unit
    pub fn child(&self, stage: &str) -> UnitId {
        UnitId(format!("{}/{}", self.0, stage))
    }

    /// The unit owning this identifier (itself, for non-stage ids)
    pub fn root(&self) -> UnitId {
        match self.0.split_once('/') {
            Some((root, _)) => UnitId(root.to_string()),
            None => self.clone(),
        }
    }

    pub fn is_stage(&self) -> bool {
        self.0.contains('/')
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The work a provisioning unit performs
#[async_trait]
pub trait UnitPayload: Send + Sync {
    /// Every deferred value this unit reads while applying
    ///
    /// Used to check at graph-build time that each producer is reachable
    /// through declared predecessor edges.
    fn consumes(&self) -> Vec<DeferredValue>;

    /// Create the unit's resources and return its output document
    async fn apply(&self, ctx: &UnitContext<'_>) -> ProvisioningResult<OutputDocument>;
}

/// A named node in the deployment graph
#[derive(Clone)]
pub struct ProvisioningUnit {
    id: UnitId,
    predecessors: Vec<UnitId>,
    payload: Arc<dyn UnitPayload>,
}

impl ProvisioningUnit {
    pub fn new(id: impl Into<UnitId>, payload: Arc<dyn UnitPayload>) -> Self {
        Self {
            id: id.into(),
            predecessors: Vec::new(),
            payload,
        }
    }

    /// Declare a predecessor that must be applied before this unit
    pub fn depends_on(mut self, predecessor: impl Into<UnitId>) -> Self {
        let predecessor = predecessor.into();
        if !self.predecessors.contains(&predecessor) {
            self.predecessors.push(predecessor);
        }
        self
    }

    pub fn id(&self) -> &UnitId {
        &self.id
    }

    pub fn predecessors(&self) -> &[UnitId] {
        &self.predecessors
    }

    pub fn payload(&self) -> &Arc<dyn UnitPayload> {
        &self.payload
    }
}

impl fmt::Debug for ProvisioningUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningUnit")
            .field("id", &self.id)
            .field("predecessors", &self.predecessors)
            .finish_non_exhaustive()
    }
}

/// Set of provisioning units with explicit predecessor edges
#[derive(Debug, Clone, Default)]
pub struct DeploymentGraph {
    units: Vec<ProvisioningUnit>,
    index: HashMap<UnitId, usize>,
}

impl DeploymentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit; identifiers must be unique and may not name a stage
    pub fn add_unit(&mut self, unit: ProvisioningUnit) -> Result<(), GraphError> {
        if unit.id().is_stage() {
            return Err(GraphError::InvalidUnitId(unit.id().clone()));
        }
        if self.index.contains_key(unit.id()) {
            return Err(GraphError::DuplicateUnit(unit.id().clone()));
        }
        self.index.insert(unit.id().clone(), self.units.len());
        self.units.push(unit);
        Ok(())
    }

    /// Add an edge forcing `unit` to be applied after `predecessor`
    ///
    /// This is the only way to force ordering.
    pub fn add_dependency(
        &mut self,
        unit: &UnitId,
        predecessor: impl Into<UnitId>,
    ) -> Result<(), GraphError> {
        let position = *self
            .index
            .get(unit)
            .ok_or_else(|| GraphError::UnknownUnit(unit.clone()))?;
        let predecessor = predecessor.into();
        let entry = &mut self.units[position];
        if !entry.predecessors.contains(&predecessor) {
            entry.predecessors.push(predecessor);
        }
        Ok(())
    }

    pub fn unit(&self, id: &UnitId) -> Option<&ProvisioningUnit> {
        self.index.get(id).map(|&i| &self.units[i])
    }

    pub fn units(&self) -> &[ProvisioningUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Compute a deterministic topological order
    ///
    /// Fails on unknown predecessors and on cycles; the cycle error lists
    /// every unit that could not be ordered.
    pub fn deployment_order(&self) -> Result<Vec<UnitId>, GraphError> {
        let mut in_degree = vec![0usize; self.units.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); self.units.len()];

        for (position, unit) in self.units.iter().enumerate() {
            for predecessor in unit.predecessors() {
                let &from = self.index.get(predecessor).ok_or_else(|| {
                    GraphError::UnknownPredecessor {
                        unit: unit.id().clone(),
                        predecessor: predecessor.clone(),
                    }
                })?;
                if from == position {
                    return Err(GraphError::Cycle(vec![unit.id().clone()]));
                }
                successors[from].push(position);
                in_degree[position] += 1;
            }
        }

        // Ready set keyed by insertion position
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(position, _)| position)
            .collect();
        let mut order = Vec::with_capacity(self.units.len());

        while let Some(next) = ready.pop_first() {
            order.push(self.units[next].id().clone());
            for &successor in &successors[next] {
                in_degree[successor] -= 1;
                if in_degree[successor] == 0 {
                    ready.insert(successor);
                }
            }
        }

        if order.len() != self.units.len() {
            let mut stuck: Vec<UnitId> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &degree)| degree > 0)
                .map(|(position, _)| self.units[position].id().clone())
                .collect();
            stuck.sort();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(order)
    }

    /// All units reachable backwards through predecessor edges
    pub fn ancestors(&self, id: &UnitId) -> BTreeSet<UnitId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&UnitId> = match self.unit(id) {
            Some(unit) => unit.predecessors().iter().collect(),
            None => return seen,
        };

        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(unit) = self.unit(current) {
                stack.extend(unit.predecessors().iter());
            }
        }
        seen
    }

    /// Check ordering and that every consumed deferred value is reachable
    ///
    /// Returns the deployment order on success. Nothing should be applied
    /// from a graph that fails validation.
    pub fn validate(&self) -> Result<Vec<UnitId>, GraphError> {
        let order = self.deployment_order()?;

        for unit in &self.units {
            let ancestors = self.ancestors(unit.id());
            for value in unit.payload().consumes() {
                let producer = value.producer();
                let owner = producer.root();

                if owner == *unit.id() {
                    // Own stages are produced earlier within the same apply
                    if producer.is_stage() {
                        continue;
                    }
                    return Err(GraphError::SelfReference(unit.id().clone()));
                }

                if producer.is_stage() {
                    return Err(GraphError::PrivateStage {
                        consumer: unit.id().clone(),
                        stage: producer.clone(),
                    });
                }

                if !ancestors.contains(&owner) {
                    return Err(GraphError::MissingDependency {
                        consumer: unit.id().clone(),
                        producer: owner,
                        value: value.to_string(),
                    });
                }
            }
        }

        Ok(order)
    }
}
