// Ingestion pipeline
// Drives documents through fetch, chunking, metadata normalization,
// embedding, and indexing. Batch runs use a bounded worker pool with
// per-document failure isolation.


use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunking::{ChunkingConfig, chunk_text};
use crate::config::Config;
use crate::documents::{Document, DocumentSource, SourceType};
use crate::embeddings::{BatchMode, EmbeddingClient};
use crate::ids::assign_id;
use crate::metadata::{ChunkContext, MappingReader, MetadataValue, normalize_metadata};
use crate::store::{VectorRecord, VectorStoreClient};
use crate::{LandmarkError, Result};

/// Stage at which a document failed to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Fetch,
    Chunking,
    Metadata,
    Embedding,
    Store,
    /// The worker task itself died (panic or abort) before producing a
    /// per-stage result
    Internal,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureCategory::Fetch => "fetch",
            FailureCategory::Chunking => "chunking",
            FailureCategory::Metadata => "metadata",
            FailureCategory::Embedding => "embedding",
            FailureCategory::Store => "store",
            FailureCategory::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

/// Terminal state of a batch run. A run that cannot start at all (the
/// embedding service is unreachable) surfaces as an error from
/// [`IngestRunner::run`] instead of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    PartiallyFailed,
    Cancelled,
}

/// One document's failure, kept for the run report.
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub category: FailureCategory,
    pub message: String,
}

/// Outcome of one document's ingestion.
pub type DocumentResult = std::result::Result<DocumentOutcome, DocumentFailure>;

/// Per-document success detail.
#[derive(Debug, Clone, Default)]
pub struct DocumentOutcome {
    pub vectors_written: usize,
    pub chunks_total: usize,
    /// Chunks whose embeddings could not be produced and were skipped
    pub chunks_skipped: usize,
}

/// Aggregate report for one batch run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub requested: usize,
    pub succeeded: usize,
    pub vectors_written: usize,
    pub chunks_skipped: usize,
    pub failed: BTreeMap<String, DocumentFailure>,
    pub duration: Duration,
}

impl RunSummary {
    fn new(run_id: Uuid, requested: usize) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            requested,
            succeeded: 0,
            vectors_written: 0,
            chunks_skipped: 0,
            failed: BTreeMap::new(),
            duration: Duration::ZERO,
        }
    }

    fn absorb(&mut self, document_id: String, result: DocumentResult) {
        match result {
            Ok(outcome) => {
                self.succeeded += 1;
                self.vectors_written += outcome.vectors_written;
                self.chunks_skipped += outcome.chunks_skipped;
            }
            Err(failure) => {
                self.failed.insert(document_id, failure);
            }
        }
    }

    fn finalize(&mut self, cancelled: bool, started: Instant) {
        self.duration = started.elapsed();
        self.status = if cancelled {
            RunStatus::Cancelled
        } else if self.failed.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::PartiallyFailed
        };
    }
}

/// Knobs for one batch run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Delete a document's prior vectors before writing new ones, so a
    /// shorter re-chunking leaves no stale tail chunks behind
    pub force_reingest: bool,
}

/// Shared pipeline dependencies, cloneable across workers.
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn DocumentSource>,
    embeddings: Arc<EmbeddingClient>,
    store: Arc<VectorStoreClient>,
    config: Arc<Config>,
}

impl Pipeline {
    #[inline]
    pub fn new(source: Arc<dyn DocumentSource>, config: Arc<Config>) -> Result<Self> {
        let retry = config.ingestion.retry.policy();
        let embeddings =
            EmbeddingClient::new(&config.embedding)?.with_retry_policy(retry.clone());
        let store = VectorStoreClient::new(&config.store)?.with_retry_policy(retry);

        Ok(Self {
            source,
            embeddings: Arc::new(embeddings),
            store: Arc::new(store),
            config,
        })
    }

    #[inline]
    pub fn with_clients(
        source: Arc<dyn DocumentSource>,
        embeddings: Arc<EmbeddingClient>,
        store: Arc<VectorStoreClient>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            source,
            embeddings,
            store,
            config,
        }
    }

    #[inline]
    pub fn embeddings(&self) -> &EmbeddingClient {
        &self.embeddings
    }

    #[inline]
    pub fn store(&self) -> &VectorStoreClient {
        &self.store
    }

    /// All document ids the source can provide.
    #[inline]
    pub async fn list_document_ids(&self) -> Result<Vec<String>> {
        self.source
            .list_ids()
            .await
            .map_err(|e| LandmarkError::Transient(format!("failed to list documents: {}", e)))
    }

    /// Ingest one document end to end. Chunk-level embedding failures are
    /// skipped and counted; every other stage failure aborts the document.
    #[inline]
    pub async fn ingest_document(
        &self,
        document_id: &str,
        options: IngestOptions,
    ) -> DocumentResult {
        let document = self.source.fetch(document_id).await.map_err(|e| {
            stage_failure(FailureCategory::Fetch, &e.to_string())
        })?;

        let chunks = chunk_text(&document.raw_text, self.chunking())
            .map_err(|e| stage_failure(FailureCategory::Chunking, &e.to_string()))?;

        if chunks.is_empty() {
            debug!("Document {} produced no chunks, nothing to index", document_id);
            return Ok(DocumentOutcome::default());
        }

        let ingested_at = Utc::now().to_rfc3339();
        let mut metadatas = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let reader = MappingReader::new(&document.structured_attributes);
            let ctx = ChunkContext {
                document_id: &document.document_id,
                source_type: document.source_type,
                title: &document.title,
            };
            let mut flat = normalize_metadata(&reader, &ctx, chunk, &self.config.store.limits)
                .map_err(|e| stage_failure(FailureCategory::Metadata, &e.to_string()))?;
            flat.insert(
                "ingested_at".to_string(),
                MetadataValue::text(ingested_at.clone()),
            );
            metadatas.push(flat);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embeddings
            .embed_chunks(&texts, BatchMode::Lenient)
            .await
            .map_err(|e| stage_failure(FailureCategory::Embedding, &e.to_string()))?;

        let chunks_total = chunks.len();
        let mut records = Vec::with_capacity(chunks_total);
        for ((chunk, metadata), embedding) in chunks.iter().zip(metadatas).zip(embeddings) {
            if let Some(values) = embedding {
                records.push(VectorRecord {
                    id: chunk_id(&document, chunk.chunk_index),
                    values,
                    metadata,
                });
            }
        }

        let chunks_skipped = chunks_total - records.len();
        if records.is_empty() {
            let err = LandmarkError::EmbeddingPartialFailure {
                failed: chunks_skipped,
                total: chunks_total,
            };
            return Err(stage_failure(FailureCategory::Embedding, &err.to_string()));
        }
        if chunks_skipped > 0 {
            warn!(
                "Document {}: {} of {} chunks skipped after embedding failures",
                document_id, chunks_skipped, chunks_total
            );
        }

        let namespace = self.config.store.namespace_for(document.source_type);

        if options.force_reingest {
            self.store
                .delete_by_document(namespace, &document.document_id)
                .await
                .map_err(|e| stage_failure(FailureCategory::Store, &e.to_string()))?;
        }

        let vectors_written = self
            .store
            .upsert(namespace, &records)
            .await
            .map_err(|e| match e {
                LandmarkError::MetadataOverflow { .. } => {
                    stage_failure(FailureCategory::Metadata, &e.to_string())
                }
                other => stage_failure(FailureCategory::Store, &other.to_string()),
            })?;

        info!(
            "Indexed document {} ({} vectors, {} chunks skipped)",
            document_id, vectors_written, chunks_skipped
        );

        Ok(DocumentOutcome {
            vectors_written,
            chunks_total,
            chunks_skipped,
        })
    }

    fn chunking(&self) -> &ChunkingConfig {
        &self.config.chunking
    }
}

fn stage_failure(category: FailureCategory, message: &str) -> DocumentFailure {
    DocumentFailure {
        category,
        message: message.to_string(),
    }
}

fn chunk_id(document: &Document, chunk_index: usize) -> String {
    let article_title = match document.source_type {
        SourceType::Article => Some(document.title.as_str()),
        SourceType::Report => None,
    };
    assign_id(
        document.source_type,
        &document.document_id,
        chunk_index,
        article_title,
    )
}

/// Batch runner: a bounded worker pool over the pipeline with cooperative
/// cancellation and a consolidated run report.
pub struct IngestRunner {
    pipeline: Pipeline,
    parallel_width: usize,
}

impl IngestRunner {
    #[inline]
    pub fn new(pipeline: Pipeline) -> Self {
        let parallel_width = pipeline.config.ingestion.parallel_width.max(1);
        Self {
            pipeline,
            parallel_width,
        }
    }

    /// Override the configured worker pool width for this runner.
    /// Width 1 means strictly sequential.
    #[inline]
    pub fn with_parallel_width(mut self, width: usize) -> Self {
        self.parallel_width = width.max(1);
        self
    }

    /// Run a batch without external cancellation.
    #[inline]
    pub async fn run(
        &self,
        document_ids: Vec<String>,
        options: IngestOptions,
    ) -> Result<RunSummary> {
        let (_tx, rx) = watch::channel(false);
        self.run_with_cancel(document_ids, options, rx).await
    }

    /// Run a batch, stopping dispatch when `cancel` flips to true.
    /// In-flight documents are allowed to finish so no document is left
    /// half-indexed.
    #[inline]
    pub async fn run_with_cancel(
        &self,
        document_ids: Vec<String>,
        options: IngestOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut summary = RunSummary::new(run_id, document_ids.len());

        if document_ids.is_empty() {
            summary.finalize(false, started);
            return Ok(summary);
        }

        // A run that cannot reach the embedding service should fail before
        // touching any document, not fail every document individually.
        self.pipeline.embeddings.ping().await?;

        info!(
            "Starting run {} over {} documents ({} workers)",
            run_id,
            document_ids.len(),
            self.parallel_width
        );

        let semaphore = Arc::new(Semaphore::new(self.parallel_width));
        let mut tasks: JoinSet<(String, DocumentResult)> = JoinSet::new();
        // Task id -> document id, so a panicked worker's document can still
        // be attributed in the run report
        let mut dispatched: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut cancelled = false;

        for document_id in document_ids {
            if *cancel.borrow() {
                cancelled = true;
                warn!("Run {} cancelled, draining in-flight documents", run_id);
                break;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| LandmarkError::Permanent(format!("worker pool closed: {}", e)))?;
            let pipeline = self.pipeline.clone();
            let dispatched_id = document_id.clone();

            let handle = tasks.spawn(async move {
                let result = pipeline.ingest_document(&document_id, options).await;
                drop(permit);
                (document_id, result)
            });
            dispatched.insert(handle.id(), dispatched_id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((task_id, (document_id, result))) => {
                    dispatched.remove(&task_id);
                    if let Err(failure) = &result {
                        error!(
                            "Document {} failed at {} stage: {}",
                            document_id, failure.category, failure.message
                        );
                    }
                    summary.absorb(document_id, result);
                }
                Err(join_error) => {
                    let document_id = dispatched
                        .remove(&join_error.id())
                        .unwrap_or_else(|| "unknown".to_string());
                    error!(
                        "Ingest worker for document {} panicked: {}",
                        document_id, join_error
                    );
                    summary.absorb(
                        document_id,
                        Err(stage_failure(
                            FailureCategory::Internal,
                            &join_error.to_string(),
                        )),
                    );
                }
            }
        }

        summary.finalize(cancelled, started);
        info!(
            "Run {} finished: {:?}, {}/{} documents succeeded, {} vectors written in {:?}",
            run_id,
            summary.status,
            summary.succeeded,
            summary.requested,
            summary.vectors_written,
            summary.duration
        );

        Ok(summary)
    }
}
