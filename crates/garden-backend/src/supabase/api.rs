//! Backend trait implementation for SupabaseBackend.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use garden_common::TrackingError;

use crate::change::{ChangeKind, Subscription};
use crate::filter::Filter;
use crate::Backend;

use super::changes::ChangeRouter;
use super::client::SupabaseBackend;
use super::rest::parse_content_range;

#[async_trait]
impl Backend for SupabaseBackend {
    async fn insert(&self, table: &str, record: Value) -> Result<(), TrackingError> {
        debug!(table, "PostgREST insert");
        let request = self
            .request(Method::POST, self.rest_url(table))
            .header("Prefer", "return=minimal")
            .json(&record);
        Self::send(request).await?;
        Ok(())
    }

    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>, TrackingError> {
        debug!(table, "PostgREST select");
        let mut query = filter.to_query_pairs();
        query.push(("select".into(), "*".into()));
        let request = self.request(Method::GET, self.rest_url(table)).query(&query);
        let response = Self::send(request).await?;
        match Self::json_body(response).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(TrackingError::Decode(format!(
                "expected a row array, got {other}"
            ))),
        }
    }

    async fn aggregate_count(&self, table: &str, filter: &Filter) -> Result<u64, TrackingError> {
        debug!(table, "PostgREST count");
        let mut query = filter.to_query_pairs();
        query.push(("select".into(), "*".into()));
        let request = self
            .request(Method::HEAD, self.rest_url(table))
            .header("Prefer", "count=exact")
            .query(&query);
        let response = Self::send(request).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| TrackingError::Decode("missing or invalid Content-Range".into()))
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Value,
    ) -> Result<(), TrackingError> {
        debug!(table, "PostgREST update");
        let request = self
            .request(Method::PATCH, self.rest_url(table))
            .header("Prefer", "return=minimal")
            .query(&filter.to_query_pairs())
            .json(&patch);
        Self::send(request).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        table: &str,
        filter: &Filter,
        kinds: &[ChangeKind],
    ) -> Result<Subscription, TrackingError> {
        let router = self
            .router
            .get_or_init(|| async { ChangeRouter::start(self.realtime.clone()) })
            .await;
        Ok(router.open(table, filter, kinds).await)
    }

    async fn rpc(&self, name: &str, payload: Value) -> Result<Value, TrackingError> {
        debug!(name, "PostgREST rpc");
        let request = self.request(Method::POST, self.rpc_url(name)).json(&payload);
        let response = Self::send(request).await?;
        Self::json_body(response).await
    }

    async fn invoke_function(&self, name: &str, payload: Value) -> Result<Value, TrackingError> {
        debug!(name, "Edge function invoke");
        let request = self
            .request(Method::POST, self.function_url(name))
            .json(&payload);
        let response = Self::send(request).await?;
        Self::json_body(response).await
    }
}
