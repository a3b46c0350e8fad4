// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dot-path flattening of object trees

use serde_json::{Map, Value};

use crate::deferred::OutputDocument;
use crate::errors::{ProvisioningError, ProvisioningResult};

/// Flatten a tree to one entry per leaf scalar, keyed by its dot-joined path
///
/// Array elements are addressed by index. Numbers and booleans keep their
/// JSON spelling, `null` becomes an empty string, and empty containers
/// contribute nothing.
pub fn flatten(value: &Value) -> OutputDocument {
    let mut document = OutputDocument::new();
    walk(value, String::new(), &mut document);
    document
}

fn walk(value: &Value, path: String, out: &mut OutputDocument) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk(child, join(&path, key), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk(child, join(&path, &index.to_string()), out);
            }
        }
        Value::String(s) => out.insert(path, s.clone()),
        Value::Null => out.insert(path, ""),
        other => out.insert(path, other.to_string()),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Rebuild a nested object tree from a flattened document
///
/// Index segments come back as object keys. Fails when one key is both a
/// leaf and the prefix of another.
pub fn unflatten(document: &OutputDocument) -> ProvisioningResult<Value> {
    let mut root = Map::new();

    for (key, leaf) in document.iter() {
        let segments: Vec<&str> = key.split('.').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| conflict(key))?;

        let mut node = &mut root;
        for segment in parents {
            let entry = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = entry.as_object_mut().ok_or_else(|| conflict(key))?;
        }

        if node.contains_key(*last) {
            return Err(conflict(key));
        }
        node.insert(last.to_string(), Value::String(leaf.to_string()));
    }

    Ok(Value::Object(root))
}

fn conflict(key: &str) -> ProvisioningError {
    ProvisioningError::Serialization(format!("flattened key {} conflicts with another key", key))
}
