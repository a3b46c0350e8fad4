// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Deployment Ordering
//!
//! Random acyclic graphs must always order predecessors first, and a single
//! back edge must stop the engine before any unit runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use vpn_sim::deferred::DeferredValue;
use vpn_sim::engine::UnitContext;
use vpn_sim::{
    DeploymentEngine, DeploymentGraph, GraphError, OutputDocument, ProvisioningError,
    ProvisioningResult, ProvisioningUnit, UnitId, UnitPayload,
};

// ============================================================================
// Test Payload
// ============================================================================

/// Records the order in which units are applied
struct Recorder(Arc<Mutex<Vec<UnitId>>>);

#[async_trait]
impl UnitPayload for Recorder {
    fn consumes(&self) -> Vec<DeferredValue> {
        Vec::new()
    }

    async fn apply(&self, ctx: &UnitContext<'_>) -> ProvisioningResult<OutputDocument> {
        self.0.lock().push(ctx.unit_id().clone());
        Ok(OutputDocument::new())
    }
}

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Predecessor lists where node `i` depends on at least one node below `i`
///
/// Every node therefore reaches node 0.
fn dag() -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1usize..10).prop_flat_map(|n| {
        let nodes: Vec<_> = (0..n)
            .map(|i| {
                if i == 0 {
                    Just(BTreeSet::new()).boxed()
                } else {
                    prop::collection::btree_set(0..i, 1..=i.min(3)).boxed()
                }
            })
            .collect();
        nodes
    })
}

/// A DAG plus the order in which its nodes are inserted
fn shuffled_dag() -> impl Strategy<Value = (Vec<BTreeSet<usize>>, Vec<usize>)> {
    dag().prop_flat_map(|preds| {
        let positions: Vec<usize> = (0..preds.len()).collect();
        (Just(preds), Just(positions).prop_shuffle())
    })
}

fn node(i: usize) -> UnitId {
    UnitId::new(format!("unit-{}", i))
}

fn build(
    preds: &[BTreeSet<usize>],
    insertion: &[usize],
    log: &Arc<Mutex<Vec<UnitId>>>,
) -> DeploymentGraph {
    let mut graph = DeploymentGraph::new();
    for &i in insertion {
        let unit = preds[i].iter().fold(
            ProvisioningUnit::new(node(i), Arc::new(Recorder(log.clone()))),
            |unit, &p| unit.depends_on(node(p)),
        );
        graph.add_unit(unit).unwrap();
    }
    graph
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: Every unit is ordered after all of its predecessors
    #[test]
    fn prop_predecessors_come_first((preds, insertion) in shuffled_dag()) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = build(&preds, &insertion, &log);
        let order = graph.deployment_order().unwrap();

        prop_assert_eq!(order.len(), preds.len());
        let position: HashMap<&UnitId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let ids: Vec<UnitId> = (0..preds.len()).map(node).collect();

        for (i, set) in preds.iter().enumerate() {
            for &p in set {
                prop_assert!(
                    position[&ids[p]] < position[&ids[i]],
                    "{} ordered before its predecessor {}", ids[i], ids[p]
                );
            }
        }
    }

    /// Property: The same graph always yields the same order
    #[test]
    fn prop_order_is_deterministic((preds, insertion) in shuffled_dag()) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = build(&preds, &insertion, &log).deployment_order().unwrap();
        let second = build(&preds, &insertion, &log).deployment_order().unwrap();
        prop_assert_eq!(first, second, "Ordering must not vary between builds");
    }

    /// Property: The engine applies units exactly in deployment order
    #[test]
    fn prop_engine_follows_order((preds, insertion) in shuffled_dag()) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = build(&preds, &insertion, &log);
        let order = graph.deployment_order().unwrap();

        let report = tokio_test::block_on(DeploymentEngine::new().apply(&graph)).unwrap();

        prop_assert!(report.is_success());
        prop_assert_eq!(log.lock().clone(), order);
    }

    /// Property: A back edge is a cycle and nothing runs
    #[test]
    fn prop_back_edge_rejected((preds, insertion) in shuffled_dag()) {
        prop_assume!(preds.len() > 1);

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = build(&preds, &insertion, &log);
        let last = preds.len() - 1;
        graph.add_dependency(&node(0), node(last)).unwrap();

        match graph.deployment_order() {
            Err(GraphError::Cycle(units)) => {
                prop_assert!(units.contains(&node(0)));
                prop_assert!(units.contains(&node(last)));
            }
            other => prop_assert!(false, "expected cycle, got {:?}", other),
        }

        let result = tokio_test::block_on(DeploymentEngine::new().apply(&graph));
        prop_assert!(matches!(
            result,
            Err(ProvisioningError::Graph(GraphError::Cycle(_)))
        ));
        prop_assert!(log.lock().is_empty(), "No unit may run from a cyclic graph");
    }
}
