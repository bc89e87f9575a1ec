//! Cache for resolved visualization modules.

use crate::resolver::ModuleInstance;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Thread-safe map from a descriptor's structural key to its resolved
/// instance. Shared process-wide; entries live for the whole session and
/// are never evicted.
#[derive(Clone, Debug, Default)]
pub struct ModuleCache {
    inner: Arc<Mutex<HashMap<String, Arc<ModuleInstance>>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Arc<ModuleInstance>> {
        let cache = self.inner.lock().await;
        cache.get(key).cloned()
    }

    /// Returns the cached instance for `key`, constructing and inserting it
    /// if absent. The check and the construction happen under one lock, so
    /// the constructor runs at most once per key.
    pub async fn get_or_insert_with<F>(&self, key: &str, construct: F) -> Arc<ModuleInstance>
    where
        F: FnOnce() -> ModuleInstance,
    {
        let mut cache = self.inner.lock().await;
        if let Some(instance) = cache.get(key) {
            return instance.clone();
        }
        let instance = Arc::new(construct());
        cache.insert(key.to_string(), instance.clone());
        instance
    }

    pub async fn len(&self) -> usize {
        let cache = self.inner.lock().await;
        cache.len()
    }
}

/// Derives the structural identity key for a descriptor: the type string
/// plus its props serialized with object keys sorted, so two descriptors
/// with the same content always share a key regardless of key order.
pub fn structural_key(type_name: &str, props: Option<&Value>) -> String {
    let canonical = match props {
        Some(value) => canonicalize(value).to_string(),
        None => "null".to_string(),
    };
    format!("{}::{}", type_name, canonical)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by_key(|(k, _)| k.as_str());
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
