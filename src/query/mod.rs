// Query engine
// Embeds a natural-language query, fans out to the per-source namespaces,
// and merges the hits into one deterministically ordered result list.


use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::documents::SourceType;
use crate::embeddings::EmbeddingClient;
use crate::metadata::{FlatMetadata, MetadataValue};
use crate::store::{ScoredMatch, StoreFilter, VectorStoreClient};
use crate::{LandmarkError, Result};

/// Scores closer than this are considered tied and fall through to the
/// deterministic tie-break.
const SCORE_EPSILON: f32 = 1e-6;

/// A search request against the index.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    /// Which sources to search; empty means all
    pub source_types: Vec<SourceType>,
    /// Restrict hits to one document
    pub document_id: Option<String>,
    /// Collapse to the best-scoring chunk per document
    pub best_per_document: bool,
}

impl SearchRequest {
    #[inline]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 10,
            source_types: Vec::new(),
            document_id: None,
            best_per_document: false,
        }
    }
}

/// One search hit with its provenance fields pulled out of the metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub document_id: String,
    pub source_type: Option<SourceType>,
    pub title: String,
    pub text: String,
    pub chunk_index: usize,
    pub ingested_at: String,
    pub metadata: FlatMetadata,
}

pub struct SearchEngine {
    embeddings: Arc<EmbeddingClient>,
    store: Arc<VectorStoreClient>,
    config: Arc<Config>,
}

impl SearchEngine {
    #[inline]
    pub fn new(
        embeddings: Arc<EmbeddingClient>,
        store: Arc<VectorStoreClient>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            embeddings,
            store,
            config,
        }
    }

    /// Execute a search. Zero hits is a normal outcome; a query that
    /// cannot be embedded is an error.
    #[inline]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        if request.query.trim().is_empty() {
            return Err(LandmarkError::Config(
                "search query cannot be empty".to_string(),
            ));
        }
        if request.top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embeddings.embed_query(&request.query).await?;

        let source_types: Vec<SourceType> = if request.source_types.is_empty() {
            SourceType::all().to_vec()
        } else {
            dedup_source_types(&request.source_types)
        };

        let filter = request
            .document_id
            .as_ref()
            .map(|id| StoreFilter::new().eq("document_id", id.as_str()));

        let mut results = Vec::new();
        for source_type in source_types {
            let namespace = self.config.store.namespace_for(source_type);
            let matches = self
                .store
                .query(namespace, &vector, request.top_k, filter.as_ref())
                .await?;
            debug!(
                "Namespace '{}' returned {} matches",
                namespace,
                matches.len()
            );
            results.extend(matches.into_iter().map(into_result));
        }

        rank_results(&mut results);
        if request.best_per_document {
            results = collapse_per_document(results);
        }
        results.truncate(request.top_k);

        info!(
            "Search returned {} results for \"{}\"",
            results.len(),
            request.query
        );
        Ok(results)
    }
}

fn dedup_source_types(requested: &[SourceType]) -> Vec<SourceType> {
    let mut seen = BTreeSet::new();
    requested
        .iter()
        .copied()
        .filter(|t| seen.insert(t.as_str()))
        .collect()
}

fn into_result(hit: ScoredMatch) -> SearchResult {
    fn text_field(metadata: &FlatMetadata, field: &str) -> String {
        match metadata.get(field) {
            Some(MetadataValue::Text(value)) => value.clone(),
            _ => String::new(),
        }
    }

    let document_id = text_field(&hit.metadata, "document_id");
    let title = text_field(&hit.metadata, "title");
    let text = text_field(&hit.metadata, "text");
    let ingested_at = text_field(&hit.metadata, "ingested_at");
    let source_type = text_field(&hit.metadata, "source_type").parse().ok();
    let chunk_index = text_field(&hit.metadata, "chunk_index").parse().unwrap_or(0);

    SearchResult {
        document_id,
        title,
        text,
        ingested_at,
        source_type,
        chunk_index,
        id: hit.id,
        score: hit.score,
        metadata: hit.metadata,
    }
}

/// Order by score descending, quantized into [`SCORE_EPSILON`]-sized
/// buckets so near-equal scores are tied. Ties break on the newest
/// ingestion timestamp, then on id. Bucketing keeps the comparison a total
/// order, so the same index state always produces the same ordering no
/// matter how the per-namespace hits arrive.
fn rank_results(results: &mut [SearchResult]) {
    fn score_bucket(score: f32) -> i64 {
        (f64::from(score) / f64::from(SCORE_EPSILON)).round() as i64
    }

    results.sort_by(|a, b| {
        score_bucket(b.score)
            .cmp(&score_bucket(a.score))
            .then_with(|| b.ingested_at.cmp(&a.ingested_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Keep only the highest-ranked chunk for each document.
fn collapse_per_document(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = BTreeSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.document_id.clone()))
        .collect()
}
