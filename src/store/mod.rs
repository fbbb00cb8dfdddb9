// Vector store client
// REST client for the external vector index: namespaced upserts, filtered
// similarity queries, document-scoped deletes, and index statistics.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::config::StoreConfig;
use crate::metadata::{FlatMetadata, MetadataLimits, serialized_size};
use crate::retry::{RetryPolicy, with_retry};
use crate::{LandmarkError, Result};

/// One embedding plus its flat metadata, addressed by a deterministic id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: FlatMetadata,
}

/// A query hit, ordered by similarity score.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScoredMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: FlatMetadata,
}

/// Index-wide statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub total_vectors: u64,
    pub dimension: usize,
    pub namespaces: BTreeMap<String, u64>,
}

/// Conjunction of metadata filter clauses, serialized in the store's
/// Mongo-style `$eq`/`$in` syntax.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreFilter {
    clauses: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq)]
enum FilterClause {
    Eq(String, String),
    In(String, Vec<String>),
}

impl StoreFilter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses
            .push(FilterClause::Eq(field.into(), value.into()));
        self
    }

    #[inline]
    pub fn any_of(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.clauses.push(FilterClause::In(field.into(), values));
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render to the store's filter JSON; empty filters render to nothing
    /// so unfiltered queries omit the field entirely.
    #[inline]
    pub fn to_json(&self) -> Option<Value> {
        if self.clauses.is_empty() {
            return None;
        }

        let mut filter = serde_json::Map::new();
        for clause in &self.clauses {
            match clause {
                FilterClause::Eq(field, value) => {
                    filter.insert(field.clone(), json!({"$eq": value}));
                }
                FilterClause::In(field, values) => {
                    filter.insert(field.clone(), json!({"$in": values}));
                }
            }
        }
        Some(Value::Object(filter))
    }
}

#[derive(Debug, Clone)]
pub struct VectorStoreClient {
    http: reqwest::Client,
    endpoint: Url,
    max_upsert_batch: usize,
    limits: MetadataLimits,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    upserted_count: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredMatch>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    dimension: usize,
    #[serde(rename = "totalVectorCount", default)]
    total_vector_count: u64,
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
struct NamespaceStats {
    #[serde(rename = "vectorCount", default)]
    vector_count: u64,
}

impl VectorStoreClient {
    #[inline]
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut endpoint = config
            .endpoint_url()
            .map_err(|e| LandmarkError::Config(e.to_string()))?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let value = reqwest::header::HeaderValue::from_str(api_key).map_err(|_| {
                LandmarkError::Config("store api_key contains invalid characters".to_string())
            })?;
            headers.insert("Api-Key", value);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| LandmarkError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            max_upsert_batch: config.max_upsert_batch.max(1),
            limits: config.limits.clone(),
            retry: RetryPolicy::default(),
        })
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Write records into a namespace, splitting into store-sized batches.
    /// Records whose metadata exceeds the store's per-record ceiling are
    /// rejected before any network traffic.
    #[inline]
    pub async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        for record in records {
            self.check_record_limits(record)?;
        }

        debug!(
            "Upserting {} vectors into namespace '{}'",
            records.len(),
            namespace
        );

        let mut written = 0;
        for batch in records.chunks(self.max_upsert_batch) {
            let body = json!({
                "namespace": namespace,
                "vectors": batch,
            });
            let response: UpsertResponse = self.post_with_retry("vectors/upsert", &body).await?;
            written += if response.upserted_count > 0 {
                response.upserted_count
            } else {
                batch.len()
            };
        }

        info!("Upserted {} vectors into namespace '{}'", written, namespace);
        Ok(written)
    }

    /// Similarity query within one namespace.
    #[inline]
    pub async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&StoreFilter>,
    ) -> Result<Vec<ScoredMatch>> {
        let mut body = json!({
            "namespace": namespace,
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(filter_json) = filter.and_then(StoreFilter::to_json) {
            body["filter"] = filter_json;
        }

        let response: QueryResponse = self.post_with_retry("query", &body).await?;
        debug!(
            "Query in namespace '{}' returned {} matches",
            namespace,
            response.matches.len()
        );
        Ok(response.matches)
    }

    /// Delete every vector belonging to one document. Used to supersede a
    /// document's prior chunks before re-ingesting it.
    #[inline]
    pub async fn delete_by_document(&self, namespace: &str, document_id: &str) -> Result<()> {
        let body = json!({
            "namespace": namespace,
            "filter": {"document_id": {"$eq": document_id}},
        });

        let _: Value = self.post_with_retry("vectors/delete", &body).await?;
        debug!(
            "Deleted vectors for document {} in namespace '{}'",
            document_id, namespace
        );
        Ok(())
    }

    /// Index statistics across all namespaces.
    #[inline]
    pub async fn stats(&self) -> Result<StoreStats> {
        let response: StatsResponse = self
            .post_with_retry("describe_index_stats", &json!({}))
            .await?;

        Ok(StoreStats {
            total_vectors: response.total_vector_count,
            dimension: response.dimension,
            namespaces: response
                .namespaces
                .into_iter()
                .map(|(name, ns)| (name, ns.vector_count))
                .collect(),
        })
    }

    /// Check that the store is reachable.
    #[inline]
    pub async fn ping(&self) -> Result<()> {
        let stats = self.stats().await?;
        info!(
            "Vector store healthy at {} ({} vectors)",
            self.endpoint, stats.total_vectors
        );
        Ok(())
    }

    fn check_record_limits(&self, record: &VectorRecord) -> Result<()> {
        let size = serialized_size(&record.metadata);
        if size > self.limits.max_metadata_bytes
            || record.metadata.len() > self.limits.max_metadata_fields
        {
            let (document_id, chunk_index) = record_identity(record);
            return Err(LandmarkError::MetadataOverflow {
                document_id,
                chunk_index,
                size,
                limit: self.limits.max_metadata_bytes,
            });
        }
        Ok(())
    }

    async fn post_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        route: &str,
        body: &Value,
    ) -> Result<T> {
        with_retry(
            || self.post(route, body),
            &self.retry,
            LandmarkError::is_transient,
            "vector store request",
        )
        .await
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, route: &str, body: &Value) -> Result<T> {
        let url = self
            .endpoint
            .join(route)
            .map_err(|e| LandmarkError::Config(format!("invalid store endpoint: {}", e)))?;

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        response
            .json()
            .await
            .map_err(|e| LandmarkError::Permanent(format!("malformed store response: {}", e)))
    }
}

fn record_identity(record: &VectorRecord) -> (String, usize) {
    use crate::metadata::MetadataValue;

    let document_id = match record.metadata.get("document_id") {
        Some(MetadataValue::Text(id)) => id.clone(),
        _ => record.id.clone(),
    };
    let chunk_index = match record.metadata.get("chunk_index") {
        Some(MetadataValue::Text(index)) => index.parse().unwrap_or(0),
        _ => 0,
    };
    (document_id, chunk_index)
}

fn classify_reqwest_error(error: reqwest::Error) -> LandmarkError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        LandmarkError::Transient(format!("store request failed: {}", error))
    } else {
        LandmarkError::Permanent(format!("store request failed: {}", error))
    }
}

fn classify_status(status: StatusCode, body: &str) -> LandmarkError {
    let summary = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )
    };

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        LandmarkError::Transient(summary)
    } else if status == StatusCode::NOT_FOUND {
        LandmarkError::NotFound(summary)
    } else {
        LandmarkError::Permanent(summary)
    }
}
