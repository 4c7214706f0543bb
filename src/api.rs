//! Remote directory API bridge.
//!
//! Talks to the backend's paginated list and mutation endpoints over HTTP.
//! The `DirectoryApi` trait is the seam the sync layer depends on, so the
//! stores can be driven against fakes in tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncError;
use crate::types::{Collection, Item, ListPage, RequestQuery};

/// Configuration for the HTTP bridge.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the directory API (e.g., `http://localhost:8000/api`).
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Remote collection endpoints as the sync layer sees them.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn list(
        &self,
        collection: Collection,
        query: &RequestQuery,
    ) -> Result<ListPage, SyncError>;

    async fn create(&self, collection: Collection, data: Value) -> Result<Item, SyncError>;

    async fn update(&self, collection: Collection, id: u64, data: Value)
        -> Result<Item, SyncError>;

    async fn delete(&self, collection: Collection, id: u64) -> Result<(), SyncError>;
}

/// reqwest-backed implementation of [`DirectoryApi`].
pub struct HttpDirectoryApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDirectoryApi {
    pub fn new(config: ApiConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn list_endpoint(&self, collection: Collection) -> String {
        format!("{}/{}/", self.base_url, collection.path())
    }

    fn item_endpoint(&self, collection: Collection, id: u64) -> String {
        format!("{}/{}/{}/", self.base_url, collection.path(), id)
    }

    /// Map non-success statuses to a typed error, with the body as context.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(SyncError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DirectoryApi for HttpDirectoryApi {
    async fn list(
        &self,
        collection: Collection,
        query: &RequestQuery,
    ) -> Result<ListPage, SyncError> {
        tracing::debug!(%collection, offset = query.offset, limit = query.limit, "Listing collection");
        let response = self
            .client
            .get(self.list_endpoint(collection))
            .query(&query.to_pairs())
            .send()
            .await?;
        let response = Self::check(response).await?;
        let body: Value = response.json().await?;
        parse_list_page(body, query)
    }

    async fn create(&self, collection: Collection, data: Value) -> Result<Item, SyncError> {
        let response = self
            .client
            .post(self.list_endpoint(collection))
            .json(&data)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn update(
        &self,
        collection: Collection,
        id: u64,
        data: Value,
    ) -> Result<Item, SyncError> {
        let response = self
            .client
            .patch(self.item_endpoint(collection, id))
            .json(&data)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, collection: Collection, id: u64) -> Result<(), SyncError> {
        let response = self
            .client
            .delete(self.item_endpoint(collection, id))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Interpret a list response body, accepting either the paginated envelope
/// `{results, count, next, previous}` or a bare item array. Anything else
/// is a malformed response.
pub fn parse_list_page(body: Value, query: &RequestQuery) -> Result<ListPage, SyncError> {
    match body {
        Value::Object(map) => {
            let results = map
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| {
                    SyncError::MalformedResponse("object without a results array".to_string())
                })?;
            let items = parse_items(results)?;
            let total = map
                .get("count")
                .and_then(Value::as_u64)
                .unwrap_or(query.offset as u64 + items.len() as u64);
            let has_next = matches!(map.get("next"), Some(v) if !v.is_null());
            let has_previous = match map.get("previous") {
                Some(v) if !v.is_null() => true,
                _ => query.offset > 0,
            };
            Ok(ListPage {
                items,
                total,
                has_next,
                has_previous,
            })
        }
        Value::Array(values) => {
            let items = parse_items(values)?;
            let total = query.offset as u64 + items.len() as u64;
            // No envelope: assume another page exists while pages come back full.
            let has_next = !items.is_empty() && items.len() as u32 == query.limit;
            Ok(ListPage {
                items,
                total,
                has_next,
                has_previous: query.offset > 0,
            })
        }
        other => Err(SyncError::MalformedResponse(format!(
            "expected an envelope or an array, got {}",
            json_type_name(&other)
        ))),
    }
}

fn parse_items(values: Vec<Value>) -> Result<Vec<Item>, SyncError> {
    values
        .into_iter()
        .map(|value| {
            serde_json::from_value::<Item>(value)
                .map_err(|e| SyncError::MalformedResponse(format!("bad item record: {e}")))
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
