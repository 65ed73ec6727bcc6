//! Supabase backend struct, URL building, and shared request plumbing.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use garden_common::TrackingError;
use garden_config::schema::{BackendConfig, RealtimeSettings};

use crate::realtime::RealtimeConfig;

use super::changes::ChangeRouter;
use super::rest::{classify_status, network_error};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend talking to a hosted Supabase project.
pub struct SupabaseBackend {
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) access_token: Option<String>,
    pub(crate) http: reqwest::Client,
    pub(crate) realtime: RealtimeConfig,
    pub(crate) router: OnceCell<ChangeRouter>,
}

impl SupabaseBackend {
    pub fn new(
        config: &BackendConfig,
        realtime: &RealtimeSettings,
    ) -> Result<Self, TrackingError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(u64::from(config.request_timeout_secs.max(1))))
            .build()
            .map_err(|e| TrackingError::Network(format!("failed to build HTTP client: {e}")))?;

        let base_url = config.base_url();
        debug!(base_url = %base_url, "Supabase backend created");

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
            http,
            realtime: RealtimeConfig::from_settings(config, realtime),
            router: OnceCell::new(),
        })
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    pub(crate) fn rpc_url(&self, name: &str) -> String {
        format!("{}/rest/v1/rpc/{name}", self.base_url)
    }

    pub(crate) fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{name}", self.base_url)
    }

    /// Signed-in user's token, or the anon key for anonymous visitors.
    fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.api_key)
    }

    /// Request with the project's auth headers attached.
    pub(crate) fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
    }

    /// Send, then turn any non-success status into a `TrackingError`.
    pub(crate) async fn send(request: RequestBuilder) -> Result<Response, TrackingError> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), &body))
    }

    /// Decode a JSON body; an empty body decodes to `null`.
    pub(crate) async fn json_body(response: Response) -> Result<Value, TrackingError> {
        let text = response.text().await.map_err(network_error)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| TrackingError::Decode(e.to_string()))
    }

    /// Close the Realtime connection if one was opened.
    pub async fn shutdown(&self) {
        if let Some(router) = self.router.get() {
            router.shutdown().await;
        }
    }
}
