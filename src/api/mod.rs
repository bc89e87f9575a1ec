use crate::environment::Environment;
use crate::grid_item::GridItem;
use serde::{Deserialize, Serialize};

pub(crate) mod client;
pub use client::ApiClient;
pub mod error;

use error::ApiError;

#[cfg(test)]
use mockall::{automock, predicate::*};

/// A dashboard as the portal persists it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub editable: bool,

    #[serde(default, rename = "accessGroups")]
    pub access_groups: Vec<String>,

    #[serde(default, rename = "unrestrictedPlacement")]
    pub unrestricted_placement: bool,

    #[serde(default, rename = "gridItems")]
    pub grid_items: Vec<GridItem>,

    #[serde(default)]
    pub notes: String,
}

/// Partial dashboard properties for an update request. Only populated
/// fields are persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(rename = "gridItems", skip_serializing_if = "Option::is_none")]
    pub grid_items: Option<Vec<GridItem>>,

    #[serde(
        rename = "unrestrictedPlacement",
        skip_serializing_if = "Option::is_none"
    )]
    pub unrestricted_placement: Option<bool>,
}

impl DashboardUpdate {
    pub fn with_grid_items(grid_items: Vec<GridItem>) -> Self {
        DashboardUpdate {
            grid_items: Some(grid_items),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetDashboardResponse {
    pub success: bool,

    #[serde(default)]
    pub dashboard: Option<Dashboard>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDashboardResponse {
    pub success: bool,

    #[serde(default)]
    pub updated_dashboard: Option<Dashboard>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonUploadResponse {
    pub success: bool,

    #[serde(default)]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonDownloadResponse {
    pub success: bool,

    #[serde(default)]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait DashboardApi: Send + Sync {
    fn environment(&self) -> &Environment;

    /// Fetch a dashboard (grid items, notes, access flags) by id.
    async fn get_dashboard(&self, id: u64) -> Result<GetDashboardResponse, ApiError>;

    /// Persist partial dashboard properties; the response echoes the
    /// updated dashboard, which is authoritative post-save.
    async fn update_dashboard(
        &self,
        id: u64,
        new_properties: DashboardUpdate,
    ) -> Result<UpdateDashboardResponse, ApiError>;

    /// Download an out-of-band JSON blob referenced by item metadata
    /// (e.g. stored map layer GeoJSON or styles).
    async fn download_json(&self, filename: &str) -> Result<JsonDownloadResponse, ApiError>;

    /// Store a JSON blob under the given filename; map layer imports use
    /// this to re-upload inlined GeoJSON and style payloads.
    async fn upload_json(&self, filename: &str, data: &str)
    -> Result<JsonUploadResponse, ApiError>;
}
