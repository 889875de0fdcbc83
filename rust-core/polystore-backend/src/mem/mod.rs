// SPDX-License-Identifier: PMPL-1.0-or-later
//
// In-memory backends.
//
// Four variants: ordered `map`/`set` over B-trees with a configurable byte
// comparator, and hashed `unordered_map`/`unordered_set` without listings.
// All four share the same config skeleton (`use_lock`, `allocators`) and the
// same batch-walk and wait/notify semantics.

pub mod map;
pub mod set;
pub mod unordered_map;
pub mod unordered_set;

use std::cmp::Ordering;

use polystore_core::registry::{self, CompareFn};
use polystore_core::{KvError, KvResult};
use serde_json::{json, Map, Value};

/// A key carrying the comparator of the map it lives in.
///
/// `BTreeMap` orders by `Ord`, which cannot be parameterized per instance;
/// every key of one backend carries the same comparator function pointer,
/// so the derived order is total and consistent within that backend.
#[derive(Clone)]
pub(crate) struct OrderedKey {
    bytes: Vec<u8>,
    cmp: CompareFn,
}

impl OrderedKey {
    pub(crate) fn new(bytes: Vec<u8>, cmp: CompareFn) -> Self {
        Self { bytes, cmp }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        (self.cmp)(&self.bytes, &other.bytes) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cmp)(&self.bytes, &other.bytes)
    }
}

impl std::fmt::Debug for OrderedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderedKey({:?})", self.bytes)
    }
}

/// Interpret a backend config as a JSON object; `null` means empty.
pub(crate) fn config_object(config: &Value) -> KvResult<Map<String, Value>> {
    match config {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        _ => Err(KvError::InvalidConfig(
            "backend config must be a JSON object".into(),
        )),
    }
}

/// Fill in `use_lock` (default true) and validate its type.
pub(crate) fn complete_use_lock(cfg: &mut Map<String, Value>) -> KvResult<()> {
    match cfg.get("use_lock") {
        None => {
            cfg.insert("use_lock".into(), json!(true));
            Ok(())
        }
        Some(Value::Bool(_)) => Ok(()),
        Some(_) => Err(KvError::InvalidConfig("use_lock must be a boolean".into())),
    }
}

/// Fill in the `allocators` block with defaults and validate it.
///
/// Per-container allocators collapse onto the global allocator; any
/// non-"default" name is rejected rather than silently ignored.
pub(crate) fn complete_allocators(cfg: &mut Map<String, Value>) -> KvResult<()> {
    let allocators = cfg.entry("allocators").or_insert_with(|| json!({}));
    let block = allocators.as_object_mut().ok_or_else(|| {
        KvError::InvalidConfig("allocators must be a JSON object".into())
    })?;
    for (name_key, config_key) in [
        ("key_allocator", "key_allocator_config"),
        ("node_allocator", "node_allocator_config"),
    ] {
        let name = match block.get(name_key) {
            None => "default".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(KvError::InvalidConfig(format!(
                    "{name_key} must be a string"
                )))
            }
        };
        if name != "default" {
            return Err(KvError::InvalidConfig(format!(
                "unknown {name_key}: {name}"
            )));
        }
        block.insert(name_key.into(), json!(name));
        match block.get(config_key) {
            None => {
                block.insert(config_key.into(), json!({}));
            }
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(KvError::InvalidConfig(format!(
                    "{config_key} must be a JSON object"
                )))
            }
        }
    }
    Ok(())
}

/// Fill in `comparator` (default "default") and resolve it through the
/// comparator registry.
pub(crate) fn complete_comparator(cfg: &mut Map<String, Value>) -> KvResult<CompareFn> {
    let name = match cfg.get("comparator") {
        None => "default".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(KvError::InvalidConfig(
                "comparator must be a string".into(),
            ))
        }
    };
    let cmp = registry::lookup_comparator(&name)
        .ok_or_else(|| KvError::InvalidConfig(format!("unknown comparator: {name}")))?;
    cfg.insert("comparator".into(), json!(name));
    Ok(cmp)
}

/// Fill in `initial_bucket_count` (default 23) for the hashed variants.
pub(crate) fn complete_bucket_count(cfg: &mut Map<String, Value>) -> KvResult<usize> {
    match cfg.get("initial_bucket_count") {
        None => {
            cfg.insert("initial_bucket_count".into(), json!(23));
            Ok(23)
        }
        Some(v) => match v.as_u64() {
            Some(n) => Ok(n as usize),
            None => Err(KvError::InvalidConfig(
                "initial_bucket_count must be an unsigned integer".into(),
            )),
        },
    }
}
