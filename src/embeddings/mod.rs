// Embedding orchestration
// Converts chunk text into fixed-dimension vectors via an external
// OpenAI-compatible embedding service, with batching, retry, and a lenient
// mode that degrades batch failures to per-chunk failures.


use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::EmbeddingConfig;
use crate::retry::{RetryPolicy, with_retry};
use crate::{LandmarkError, Result};

/// How a multi-chunk embedding request treats per-chunk failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Any failure fails the whole request
    Strict,
    /// Failures are reported per chunk; healthy chunks still succeed
    Lenient,
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    endpoint: Url,
    model: String,
    dimension: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let mut endpoint = config
            .endpoint_url()
            .map_err(|e| LandmarkError::Config(e.to_string()))?;
        // A trailing slash keeps Url::join from replacing the last path
        // segment ("/v1" + "embeddings" must be "/v1/embeddings")
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| {
                    LandmarkError::Config(
                        "embedding api_key contains invalid characters".to_string(),
                    )
                })?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| LandmarkError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::default(),
        })
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Check that the embedding service is reachable and the configured
    /// model produces vectors of the configured dimension.
    #[inline]
    pub async fn ping(&self) -> Result<()> {
        debug!("Pinging embedding service at {}", self.endpoint);

        let probe = vec!["ping".to_string()];
        let vectors = self.request_embeddings(&probe).await?;

        if vectors.len() != 1 {
            return Err(LandmarkError::Permanent(format!(
                "embedding service returned {} vectors for 1 input",
                vectors.len()
            )));
        }

        info!(
            "Embedding service healthy at {} (model {}, {} dimensions)",
            self.endpoint, self.model, self.dimension
        );
        Ok(())
    }

    /// Embed a single query string.
    #[inline]
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let input = vec![text.to_string()];
        let mut vectors = self.embed_texts(&input).await?;
        vectors.pop().ok_or_else(|| {
            LandmarkError::Permanent("embedding service returned no vector".to_string())
        })
    }

    /// Embed texts in order, splitting into service-sized batches. Strict:
    /// any failure propagates.
    #[inline]
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts", texts.len());

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_vectors = self.embed_batch_with_retry(batch).await?;
            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }

    /// Embed texts, degrading batch failures to per-item failures so one
    /// bad chunk cannot sink a whole document. The result is parallel to
    /// the input: `None` marks a chunk whose embedding could not be
    /// produced within the retry budget.
    ///
    /// Authentication failures still propagate: every fallback request
    /// would fail identically.
    #[inline]
    pub async fn embed_texts_lenient(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            match self.embed_batch_with_retry(batch).await {
                Ok(vectors) => results.extend(vectors.into_iter().map(Some)),
                Err(e) if is_auth_error(&e) => return Err(e),
                Err(e) => {
                    warn!(
                        "Batch of {} failed ({}), retrying items individually",
                        batch.len(),
                        e
                    );
                    for text in batch {
                        let single = std::slice::from_ref(text);
                        match self.embed_batch_with_retry(single).await {
                            Ok(mut vectors) => results.push(vectors.pop()),
                            Err(item_err) if is_auth_error(&item_err) => return Err(item_err),
                            Err(item_err) => {
                                warn!("Chunk failed to embed: {}", item_err);
                                results.push(None);
                            }
                        }
                    }
                }
            }
        }

        Ok(results)
    }

    /// Embed chunk texts in the requested mode. Strict mode converts any
    /// failure into a whole-request error.
    #[inline]
    pub async fn embed_chunks(
        &self,
        texts: &[String],
        mode: BatchMode,
    ) -> Result<Vec<Option<Vec<f32>>>> {
        match mode {
            BatchMode::Strict => {
                let vectors = self.embed_texts(texts).await?;
                Ok(vectors.into_iter().map(Some).collect())
            }
            BatchMode::Lenient => {
                let results = self.embed_texts_lenient(texts).await?;
                let failed = results.iter().filter(|r| r.is_none()).count();
                if failed > 0 {
                    debug!("{} of {} chunks failed to embed", failed, texts.len());
                }
                Ok(results)
            }
        }
    }

    async fn embed_batch_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        with_retry(
            || self.request_embeddings(batch),
            &self.retry,
            LandmarkError::is_transient,
            "embedding request",
        )
        .await
    }

    /// One call to the embedding service.
    async fn request_embeddings(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self
            .endpoint
            .join("embeddings")
            .map_err(|e| LandmarkError::Config(format!("invalid embedding endpoint: {}", e)))?;

        let request = EmbedRequest {
            model: &self.model,
            input: batch,
        };

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            LandmarkError::Permanent(format!("malformed embedding response: {}", e))
        })?;

        self.validate_response(parsed, batch.len())
    }

    fn validate_response(&self, response: EmbedResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
        if response.data.len() != expected {
            return Err(LandmarkError::Permanent(format!(
                "embedding service returned {} vectors for {} inputs",
                response.data.len(),
                expected
            )));
        }

        let mut data = response.data;
        // Services may return out of order; the index field restores it
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index.unwrap_or(0));
        }

        for item in &data {
            if item.embedding.len() != self.dimension {
                return Err(LandmarkError::Permanent(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    item.embedding.len()
                )));
            }
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> LandmarkError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        LandmarkError::Transient(format!("embedding request failed: {}", error))
    } else {
        LandmarkError::Permanent(format!("embedding request failed: {}", error))
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

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        LandmarkError::Permanent(format!("authentication failed ({})", summary))
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        LandmarkError::Transient(summary)
    } else {
        LandmarkError::Permanent(summary)
    }
}

fn is_auth_error(error: &LandmarkError) -> bool {
    matches!(error, LandmarkError::Permanent(msg) if msg.starts_with("authentication failed"))
}
