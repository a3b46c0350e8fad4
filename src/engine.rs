// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment Engine
//!
//! Applies a validated [`DeploymentGraph`] one unit at a time in topological
//! order. A unit starts only after every predecessor has published its
//! output; its external queries are awaited to completion before the next
//! unit begins.
//!
//! # Failure Semantics
//!
//! - A unit that returns an error is marked `Failed`
//! - Every unit depending on it (directly or transitively) is `Skipped`
//! - Units on independent branches are still applied
//! - Nothing is retried or rolled back here; re-applying a partial
//!   deployment is left to the operator

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deferred::{DeferredValue, Outputs, StagedOutputs, ValueSource};
use crate::errors::ProvisioningResult;
use crate::graph::{DeploymentGraph, UnitId};

/// What a unit sees while it is being applied
pub struct UnitContext<'a> {
    unit: &'a UnitId,
    outputs: &'a Outputs,
}

impl<'a> UnitContext<'a> {
    pub fn new(unit: &'a UnitId, outputs: &'a Outputs) -> Self {
        Self { unit, outputs }
    }

    pub fn unit_id(&self) -> &UnitId {
        self.unit
    }

    /// Outputs of every unit applied so far
    pub fn outputs(&self) -> &Outputs {
        self.outputs
    }

    /// Overlay for unit-private intermediate documents
    pub fn staged(&self) -> StagedOutputs<'_> {
        StagedOutputs::new(self.outputs)
    }
}

impl ValueSource for UnitContext<'_> {
    fn resolve(&self, value: &DeferredValue) -> ProvisioningResult<String> {
        self.outputs.resolve(value)
    }
}

/// Final state of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Applied,
    Failed { reason: String },
    Skipped { blocked_by: UnitId },
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub unit: UnitId,
    #[serde(flatten)]
    pub status: UnitStatus,
    pub duration_ms: u64,
}

/// Result of applying a deployment graph
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub deployment_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub order: Vec<UnitId>,
    pub outcomes: Vec<UnitOutcome>,
    pub outputs: Outputs,
}

impl DeploymentReport {
    /// True when every unit was applied
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, UnitStatus::Applied))
    }

    pub fn status(&self, unit: &UnitId) -> Option<&UnitStatus> {
        self.outcomes
            .iter()
            .find(|o| &o.unit == unit)
            .map(|o| &o.status)
    }

    /// Units in the order they were applied
    pub fn applied(&self) -> Vec<&UnitId> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, UnitStatus::Applied))
            .map(|o| &o.unit)
            .collect()
    }

    pub fn failed(&self) -> Vec<&UnitId> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, UnitStatus::Failed { .. }))
            .map(|o| &o.unit)
            .collect()
    }
}

/// Sequential graph driver
#[derive(Debug, Clone, Default)]
pub struct DeploymentEngine;

impl DeploymentEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validate and apply the whole graph
    ///
    /// Returns an error only when validation fails, in which case no unit has
    /// run. Unit failures are reported in the [`DeploymentReport`].
    pub async fn apply(&self, graph: &DeploymentGraph) -> ProvisioningResult<DeploymentReport> {
        let order = graph.validate()?;
        let deployment_id = Uuid::now_v7();
        let started_at = Utc::now();

        info!(%deployment_id, units = order.len(), "Starting deployment");

        let mut outputs = Outputs::new();
        let mut outcomes = Vec::with_capacity(order.len());
        let mut not_applied: BTreeSet<UnitId> = BTreeSet::new();

        for id in &order {
            let Some(unit) = graph.unit(id) else {
                continue;
            };

            if let Some(blocker) = unit
                .predecessors()
                .iter()
                .find(|p| not_applied.contains(*p))
            {
                warn!(unit = %id, blocked_by = %blocker, "Skipping unit");
                not_applied.insert(id.clone());
                outcomes.push(UnitOutcome {
                    unit: id.clone(),
                    status: UnitStatus::Skipped {
                        blocked_by: blocker.clone(),
                    },
                    duration_ms: 0,
                });
                continue;
            }

            info!(unit = %id, "Applying unit");
            let start = Instant::now();
            let result = {
                let ctx = UnitContext::new(id, &outputs);
                unit.payload().apply(&ctx).await
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            let status = match result.and_then(|document| {
                debug!(unit = %id, keys = document.len(), "Publishing unit output");
                outputs.publish(id.clone(), document)
            }) {
                Ok(()) => {
                    info!(unit = %id, duration_ms, "Unit applied");
                    UnitStatus::Applied
                }
                Err(e) => {
                    error!(unit = %id, error = %e, "Unit failed");
                    not_applied.insert(id.clone());
                    UnitStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            outcomes.push(UnitOutcome {
                unit: id.clone(),
                status,
                duration_ms,
            });
        }

        let report = DeploymentReport {
            deployment_id,
            started_at,
            finished_at: Utc::now(),
            order,
            outcomes,
            outputs,
        };

        if report.is_success() {
            info!(%deployment_id, "Deployment complete");
        } else {
            warn!(%deployment_id, failed = report.failed().len(), "Deployment incomplete");
        }

        Ok(report)
    }
}
