//! Grid Item
//!
//! One placed widget instance on a dashboard, in the exact shape the
//! dashboard API persists: grid geometry plus the visualization source and
//! its serialized argument/metadata payloads.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

/// Source string marking an item as a variable-input producer.
pub const VARIABLE_INPUT_SOURCE: &str = "Variable Input";

/// Source string marking an item as a map visualization.
pub const MAP_SOURCE: &str = "Map";

#[derive(Debug, Error, PartialEq)]
pub enum GridItemError {
    #[error("Grid item '{0}' must have positive width and height")]
    NonPositiveSize(String),

    #[error("Duplicate grid item key '{0}'")]
    DuplicateKey(String),

    #[error("Grid item payload is not valid JSON: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridItem {
    /// Stable key, unique within a dashboard
    pub i: String,

    /// Grid-cell coordinates of the top-left corner
    pub x: u32,
    pub y: u32,

    /// Grid-cell dimensions
    pub w: u32,
    pub h: u32,

    /// Which visualization/plugin implementation renders this item
    pub source: String,

    /// JSON-encoded arguments specific to `source`
    pub args_string: String,

    /// JSON-encoded metadata (aspect ratio enforcement, refresh rate, ...)
    pub metadata_string: String,
}

/// Structured metadata parsed from `metadata_string`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    #[serde(default)]
    pub enforce_aspect_ratio: bool,

    #[serde(default)]
    pub aspect_ratio: Option<f64>,

    /// Auto-refresh interval in minutes; 0 disables refreshing.
    #[serde(default)]
    pub refresh_rate: u64,
}

/// A dashboard-scoped variable value, referenced via `${name}` templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Arguments parsed from a variable-input item's `args_string`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInputArgs {
    pub variable_name: String,

    #[serde(default)]
    pub variable_options_source: Option<String>,

    #[serde(default)]
    pub initial_value: Option<VariableValue>,
}

impl GridItem {
    /// Parses `metadata_string` into structured metadata.
    pub fn metadata(&self) -> Result<ItemMetadata, GridItemError> {
        serde_json::from_str(&self.metadata_string)
            .map_err(|e| GridItemError::MalformedPayload(e.to_string()))
    }

    /// Parses `args_string` into an untyped JSON value.
    pub fn args(&self) -> Result<serde_json::Value, GridItemError> {
        serde_json::from_str(&self.args_string)
            .map_err(|e| GridItemError::MalformedPayload(e.to_string()))
    }

    /// Parses variable-input arguments if this item is a variable-input
    /// producer; `None` for every other source.
    pub fn variable_input_args(&self) -> Option<VariableInputArgs> {
        if self.source != VARIABLE_INPUT_SOURCE {
            return None;
        }
        serde_json::from_str(&self.args_string).ok()
    }
}

impl Display for GridItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Item {}: {} at ({}, {}) size {}x{}",
            self.i, self.source, self.x, self.y, self.w, self.h
        )
    }
}

/// Checks sequence-level invariants: positive sizes and unique keys.
pub fn validate_sequence(items: &[GridItem]) -> Result<(), GridItemError> {
    let mut seen = std::collections::HashSet::new();
    for item in items {
        if item.w == 0 || item.h == 0 {
            return Err(GridItemError::NonPositiveSize(item.i.clone()));
        }
        if !seen.insert(item.i.as_str()) {
            return Err(GridItemError::DuplicateKey(item.i.clone()));
        }
    }
    Ok(())
}
