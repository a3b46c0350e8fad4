// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Flattening and Filtering
//!
//! Flattening turns a nested configuration tree into dot-path keys. These
//! properties must hold for every tree, not just the tunnel documents the
//! resolver sees in practice.

use proptest::prelude::*;
use serde_json::{Map, Value};

use vpn_sim::resolver::{flatten, unflatten};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Scalar leaves; keys never contain dots
fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9/ ]{0,8}".prop_map(Value::String),
        any::<u32>().prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
    ]
}

/// Nested objects and arrays up to four levels deep
fn tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::btree_map("[a-z_]{1,6}", inner.clone(), 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
            prop::collection::vec(inner, 0..4).prop_map(Value::Array),
        ]
    })
}

/// Document root is always an object, as parsed XML is
fn document() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z_]{1,6}", tree(), 1..4)
        .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>()))
}

fn prefixes() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z_.0-9]{0,4}", 0..4)
}

fn leaf_count(value: &Value) -> usize {
    match value {
        Value::Object(map) => map.values().map(leaf_count).sum(),
        Value::Array(items) => items.iter().map(leaf_count).sum(),
        _ => 1,
    }
}

/// Follow a dot path through objects and arrays
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: One entry per leaf scalar
    #[test]
    fn prop_one_entry_per_leaf(doc in document()) {
        let flat = flatten(&doc);
        prop_assert_eq!(flat.len(), leaf_count(&doc));
    }

    /// Property: Every key addresses the leaf it was taken from
    #[test]
    fn prop_keys_address_their_leaf(doc in document()) {
        let flat = flatten(&doc);
        for (key, value) in flat.iter() {
            let leaf = lookup(&doc, key);
            prop_assert!(leaf.is_some(), "key {} does not address a leaf", key);
            prop_assert_eq!(render(leaf.unwrap()), value);
        }
    }

    /// Property: Rebuilding the tree keeps every leaf value
    #[test]
    fn prop_unflatten_round_trip(doc in document()) {
        let flat = flatten(&doc);
        let rebuilt = unflatten(&flat).unwrap();
        prop_assert_eq!(flatten(&rebuilt), flat);
    }

    /// Property: Filtering yields a prefix-matching subset
    #[test]
    fn prop_filter_is_prefix_subset(doc in document(), prefixes in prefixes()) {
        let flat = flatten(&doc);
        let filtered = flat.filtered(&prefixes);

        prop_assert!(filtered.len() <= flat.len());
        for (key, value) in filtered.iter() {
            prop_assert_eq!(flat.get(key), Some(value));
            if !prefixes.is_empty() {
                prop_assert!(prefixes.iter().any(|p| key.starts_with(p.as_str())));
            }
        }
        for (key, _) in flat.iter() {
            let matches =
                prefixes.is_empty() || prefixes.iter().any(|p| key.starts_with(p.as_str()));
            prop_assert_eq!(filtered.contains_key(key), matches);
        }
    }

    /// Property: No prefixes keeps everything
    #[test]
    fn prop_empty_filter_is_identity(doc in document()) {
        let flat = flatten(&doc);
        let none: Vec<String> = Vec::new();
        prop_assert_eq!(flat.filtered(&none), flat);
    }
}
