//! TethysDash Portal Client
//!
//! A client for the dashboard persistence API, handling dashboard retrieval,
//! layout updates, and stored JSON blob downloads.

use crate::api::error::ApiError;
use crate::api::{
    DashboardApi, DashboardUpdate, GetDashboardResponse, JsonDownloadResponse, JsonUploadResponse,
    UpdateDashboardResponse,
};
use crate::consts::engine_consts::dashboard_api;
use crate::environment::Environment;
use reqwest::{Client, ClientBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

// User-Agent string with CLI version
const USER_AGENT: &str = concat!("tethysdash-cli/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    environment: Environment,
}

impl ApiClient {
    pub fn new(environment: Environment) -> Self {
        Self {
            client: ClientBuilder::new()
                .connect_timeout(dashboard_api::connect_timeout())
                .timeout(dashboard_api::request_timeout())
                .build()
                .expect("Failed to create HTTP client"),
            environment,
        }
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.environment.portal_url().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    async fn handle_response_status(response: Response) -> Result<Response, ApiError> {
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        Ok(response)
    }

    async fn get_request<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let url = self.build_url(endpoint);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let response = Self::handle_response_status(response).await?;
        let response_bytes = response.bytes().await?;
        serde_json::from_slice(&response_bytes).map_err(ApiError::Decode)
    }

    async fn post_request<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.build_url(endpoint);
        let response = self
            .client
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .json(body)
            .send()
            .await?;

        let response = Self::handle_response_status(response).await?;
        let response_bytes = response.bytes().await?;
        serde_json::from_slice(&response_bytes).map_err(ApiError::Decode)
    }
}

#[async_trait::async_trait]
impl DashboardApi for ApiClient {
    fn environment(&self) -> &Environment {
        &self.environment
    }

    async fn get_dashboard(&self, id: u64) -> Result<GetDashboardResponse, ApiError> {
        let endpoint = format!("api/dashboards/{}", id);
        self.get_request(&endpoint).await
    }

    async fn update_dashboard(
        &self,
        id: u64,
        new_properties: DashboardUpdate,
    ) -> Result<UpdateDashboardResponse, ApiError> {
        let endpoint = format!("api/dashboards/{}/update", id);
        let body = serde_json::json!({ "newProperties": new_properties });
        self.post_request(&endpoint, &body).await
    }

    async fn download_json(&self, filename: &str) -> Result<JsonDownloadResponse, ApiError> {
        let endpoint = format!("api/json/download?filename={}", filename);
        self.get_request(&endpoint).await
    }

    async fn upload_json(
        &self,
        filename: &str,
        data: &str,
    ) -> Result<JsonUploadResponse, ApiError> {
        let body = serde_json::json!({ "filename": filename, "data": data });
        self.post_request("api/json/upload", &body).await
    }
}
