// Document model and source collaborators
// Connectors (PDF extraction, article fetchers) live outside the core;
// the pipeline consumes their output through the DocumentSource trait.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Where a document came from. Drives id assignment and the store
/// namespace the document's vectors land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Report,
    Article,
}

impl SourceType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Report => "report",
            SourceType::Article => "article",
        }
    }

    #[inline]
    pub fn all() -> [SourceType; 2] {
        [SourceType::Report, SourceType::Article]
    }
}

impl fmt::Display for SourceType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "report" => Ok(SourceType::Report),
            "article" => Ok(SourceType::Article),
            other => Err(format!(
                "unknown source type '{}' (expected 'report' or 'article')",
                other
            )),
        }
    }
}

/// A unit of source content, fetched fresh per ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable external identifier (e.g. "LP-00001")
    pub document_id: String,
    pub source_type: SourceType,
    pub title: String,
    pub raw_text: String,
    /// Arbitrary-depth structured metadata from the source record
    #[serde(default)]
    pub structured_attributes: Map<String, Value>,
    /// Optional marker for change detection; never part of the vector id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_marker: Option<String>,
}

/// Typed failure from a document source, distinguishing "not found" from
/// transient fetch problems so the orchestrator can categorize them.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("transient fetch error: {0}")]
    Transient(String),

    #[error("fetch error: {0}")]
    Permanent(String),
}

/// Narrow seam to the external document connectors.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch a single document by its external id.
    async fn fetch(&self, document_id: &str) -> Result<Document, FetchError>;

    /// List the ids this source can provide, in stable order.
    async fn list_ids(&self) -> Result<Vec<String>, FetchError>;
}

/// In-memory source backed by a fixed set of documents. Used by tests and
/// small demos.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    documents: BTreeMap<String, Document>,
}

impl InMemorySource {
    #[inline]
    pub fn new(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|d| (d.document_id.clone(), d))
                .collect(),
        }
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    async fn fetch(&self, document_id: &str) -> Result<Document, FetchError> {
        self.documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(document_id.to_string()))
    }

    async fn list_ids(&self) -> Result<Vec<String>, FetchError> {
        Ok(self.documents.keys().cloned().collect())
    }
}

/// Source reading one JSON document per file from a directory. This is the
/// seam the CLI uses in place of the real PDF/article connectors: whatever
/// extracted the text upstream serializes a `Document` to
/// `{document_id}.json`.
#[derive(Debug, Clone)]
pub struct JsonDirectorySource {
    dir: PathBuf,
}

impl JsonDirectorySource {
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DocumentSource for JsonDirectorySource {
    async fn fetch(&self, document_id: &str) -> Result<Document, FetchError> {
        let path = self.dir.join(format!("{}.json", document_id));
        debug!("Loading document from {}", path.display());

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(document_id.to_string()));
            }
            Err(e) => {
                return Err(FetchError::Transient(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            FetchError::Permanent(format!("malformed document {}: {}", path.display(), e))
        })
    }

    async fn list_ids(&self) -> Result<Vec<String>, FetchError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| FetchError::Transient(format!("failed to list documents: {}", e)))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to list documents: {}", e)))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}
