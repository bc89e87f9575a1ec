//! Module Resolver
//!
//! Turns a declarative visualization type descriptor `{type, props}` into a
//! constructed module instance. Nested descriptors inside `props` (a layer's
//! data source, a style's stroke) are resolved depth-first before the outer
//! construction. Results are memoized process-wide by the descriptor's
//! structural identity, so resolving the same descriptor twice yields the
//! same shared instance.

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub mod cache;
pub mod module_map;

pub use cache::ModuleCache;
pub use module_map::{Importer, ModuleExports, ModuleRegistry};

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("No module path found for type '{0}'.")]
    UnknownType(String),

    #[error("No importer found for module path '{0}'.")]
    UnknownImporter(String),

    #[error("Module '{0}' does not export a constructor.")]
    NotAConstructor(String),
}

/// A declarative reference to a visualization implementation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceDescriptor {
    #[serde(rename = "type")]
    pub type_name: String,

    /// Structured construction arguments; `null` means no props.
    #[serde(default)]
    pub props: Option<Value>,
}

impl SourceDescriptor {
    pub fn new(type_name: impl Into<String>, props: Option<Value>) -> Self {
        SourceDescriptor {
            type_name: type_name.into(),
            // Normalize an explicit JSON null to "no props"
            props: props.filter(|p| !p.is_null()),
        }
    }
}

/// A prop value after resolution: plain data, or a nested resolved module.
#[derive(Debug, Clone)]
pub enum ResolvedProp {
    Value(Value),
    Instance(Arc<ModuleInstance>),
    List(Vec<ResolvedProp>),
    Object(ResolvedProps),
}

pub type ResolvedProps = BTreeMap<String, ResolvedProp>;

/// A constructed visualization module instance.
#[derive(Debug)]
pub struct ModuleInstance {
    /// Catalog module path the instance was constructed from.
    pub kind: String,
    pub props: ResolvedProps,
}

impl ModuleInstance {
    pub fn new(kind: String, props: ResolvedProps) -> Self {
        ModuleInstance { kind, props }
    }
}

pub type Constructor = Arc<dyn Fn(ResolvedProps) -> ModuleInstance + Send + Sync>;

pub struct ModuleResolver {
    registry: ModuleRegistry,
    cache: ModuleCache,
}

impl ModuleResolver {
    pub fn new() -> Self {
        Self::with_registry(ModuleRegistry::new())
    }

    /// Resolver over caller-supplied catalog tables.
    pub fn with_registry(registry: ModuleRegistry) -> Self {
        ModuleResolver {
            registry,
            cache: ModuleCache::new(),
        }
    }

    pub fn cache(&self) -> ModuleCache {
        self.cache.clone()
    }

    /// Resolves a descriptor to its constructed instance, memoized by the
    /// descriptor's structural key.
    pub fn resolve<'a>(
        &'a self,
        descriptor: &'a SourceDescriptor,
    ) -> BoxFuture<'a, Result<Arc<ModuleInstance>, ResolveError>> {
        Box::pin(async move {
            let key = cache::structural_key(&descriptor.type_name, descriptor.props.as_ref());
            if let Some(instance) = self.cache.get(&key).await {
                return Ok(instance);
            }

            let path = self
                .registry
                .module_path(&descriptor.type_name)
                .ok_or_else(|| ResolveError::UnknownType(descriptor.type_name.clone()))?;
            let importer = self
                .registry
                .importer(path)
                .ok_or_else(|| ResolveError::UnknownImporter(path.to_string()))?;
            let exports = importer();
            let construct = exports
                .default
                .ok_or_else(|| ResolveError::NotAConstructor(descriptor.type_name.clone()))?;

            // Resolve nested descriptors before constructing the outer
            // instance; recursion happens outside the cache lock.
            let props = self.resolve_props(descriptor.props.as_ref()).await?;

            Ok(self
                .cache
                .get_or_insert_with(&key, move || construct(props))
                .await)
        })
    }

    async fn resolve_props(&self, props: Option<&Value>) -> Result<ResolvedProps, ResolveError> {
        let mut resolved = ResolvedProps::new();
        let Some(Value::Object(map)) = props else {
            return Ok(resolved);
        };
        for (key, value) in map {
            resolved.insert(key.clone(), self.resolve_value(value).await?);
        }
        Ok(resolved)
    }

    fn resolve_value<'a>(
        &'a self,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<ResolvedProp, ResolveError>> {
        Box::pin(async move {
            match value {
                // An object carrying both `type` and `props` is a nested
                // module configuration.
                Value::Object(map)
                    if map.get("type").is_some_and(Value::is_string)
                        && map.contains_key("props") =>
                {
                    let descriptor = SourceDescriptor::new(
                        map["type"].as_str().unwrap_or_default(),
                        map.get("props").cloned(),
                    );
                    Ok(ResolvedProp::Instance(self.resolve(&descriptor).await?))
                }
                Value::Object(map) => {
                    let mut resolved = ResolvedProps::new();
                    for (key, nested) in map {
                        resolved.insert(key.clone(), self.resolve_value(nested).await?);
                    }
                    Ok(ResolvedProp::Object(resolved))
                }
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.resolve_value(item).await?);
                    }
                    Ok(ResolvedProp::List(resolved))
                }
                Value::String(s) => Ok(ResolvedProp::Value(convert_type(s))),
                other => Ok(ResolvedProp::Value(other.clone())),
            }
        })
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Coerces a string prop to a number when it converts cleanly; leading-`.`
/// decimal strings get a `0` prefix first. Anything else passes through.
fn convert_type(input: &str) -> Value {
    let mut value = input.to_string();
    if value.starts_with('.') {
        value = format!("0{}", value);
    }

    if let Ok(int_val) = value.parse::<i64>() {
        if int_val.to_string() == value {
            return Value::from(int_val);
        }
    }

    if let Ok(float_val) = value.parse::<f64>() {
        if float_val.is_finite() && float_val.to_string() == value {
            return Value::from(float_val);
        }
    }

    Value::String(input.to_string())
}
