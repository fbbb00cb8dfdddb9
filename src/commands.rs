use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{Config, get_config_dir};
use crate::documents::{DocumentSource, JsonDirectorySource, SourceType};
use crate::embeddings::EmbeddingClient;
use crate::pipeline::{IngestOptions, IngestRunner, Pipeline, RunStatus};
use crate::query::{SearchEngine, SearchRequest};
use crate::store::VectorStoreClient;

fn load_config(config_dir: Option<PathBuf>) -> Result<Config> {
    let dir = match config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };
    Config::load(dir)
}

/// Ingest documents from a directory of extracted JSON documents into the
/// vector index.
#[inline]
pub async fn ingest(
    docs_dir: PathBuf,
    ids: Vec<String>,
    force: bool,
    parallel: Option<usize>,
    config_dir: Option<PathBuf>,
) -> Result<()> {
    let config = Arc::new(load_config(config_dir)?);
    let source = Arc::new(JsonDirectorySource::new(docs_dir));

    let document_ids = if ids.is_empty() {
        source
            .list_ids()
            .await
            .context("Failed to list documents in the source directory")?
    } else {
        ids
    };

    if document_ids.is_empty() {
        println!("No documents to ingest.");
        return Ok(());
    }

    info!("Ingesting {} documents", document_ids.len());

    let pipeline = Pipeline::new(source, Arc::clone(&config))?;
    let mut runner = IngestRunner::new(pipeline);
    if let Some(width) = parallel {
        runner = runner.with_parallel_width(width);
    }

    // Ctrl+C stops dispatching new documents; in-flight ones finish so no
    // document is left half-indexed.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight documents");
            let _ = cancel_tx.send(true);
        }
    });

    let options = IngestOptions {
        force_reingest: force,
    };
    let summary = runner
        .run_with_cancel(document_ids, options, cancel_rx)
        .await
        .context("Ingestion run could not start")?;

    println!("Run {} finished in {:?}", summary.run_id, summary.duration);
    println!(
        "  Documents: {}/{} succeeded",
        summary.succeeded, summary.requested
    );
    println!("  Vectors written: {}", summary.vectors_written);
    if summary.chunks_skipped > 0 {
        println!(
            "  Chunks skipped (embedding failures): {}",
            summary.chunks_skipped
        );
    }

    if !summary.failed.is_empty() {
        println!("  Failed documents:");
        for (document_id, failure) in &summary.failed {
            println!(
                "    {} [{}]: {}",
                document_id, failure.category, failure.message
            );
        }
    }

    // Document failures are part of the run report, not a command error;
    // only a run that cannot start propagates as Err.
    match summary.status {
        RunStatus::Completed => println!("Status: completed"),
        RunStatus::PartiallyFailed => println!("Status: completed with failures"),
        RunStatus::Cancelled => println!("Status: cancelled"),
    }

    Ok(())
}

/// Search the index and print the best-matching chunks.
#[inline]
pub async fn search(
    query: String,
    top_k: usize,
    source_type: Option<SourceType>,
    document_id: Option<String>,
    best_per_document: bool,
    config_dir: Option<PathBuf>,
) -> Result<()> {
    let config = Arc::new(load_config(config_dir)?);
    let embeddings = Arc::new(EmbeddingClient::new(&config.embedding)?);
    let store = Arc::new(VectorStoreClient::new(&config.store)?);
    let engine = SearchEngine::new(embeddings, store, config);

    let request = SearchRequest {
        top_k,
        source_types: source_type.into_iter().collect(),
        document_id,
        best_per_document,
        ..SearchRequest::new(query)
    };

    let results = engine.search(&request).await?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} results:", results.len());
    println!();

    for (rank, result) in results.iter().enumerate() {
        let source = result
            .source_type
            .map_or("unknown", SourceType::as_str);
        println!(
            "{}. {} (score {:.4}, {} chunk {})",
            rank + 1,
            result.title,
            result.score,
            source,
            result.chunk_index
        );
        println!("   Document: {}", result.document_id);

        let preview: String = result.text.chars().take(200).collect();
        if result.text.chars().count() > 200 {
            println!("   {}...", preview.trim_end());
        } else {
            println!("   {}", preview.trim_end());
        }
        println!();
    }

    Ok(())
}

/// Show service health and index statistics.
#[inline]
pub async fn show_status(config_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_dir)?;

    println!("Embedding service:");
    match EmbeddingClient::new(&config.embedding) {
        Ok(client) => match client.ping().await {
            Ok(()) => {
                println!("  Connected: {}", config.embedding.endpoint);
                println!("  Model: {}", config.embedding.model);
                println!("  Dimension: {}", config.embedding.dimension);
            }
            Err(e) => println!("  Unreachable: {}", e),
        },
        Err(e) => println!("  Misconfigured: {}", e),
    }

    println!();
    println!("Vector store:");
    match VectorStoreClient::new(&config.store) {
        Ok(client) => match client.stats().await {
            Ok(stats) => {
                println!("  Connected: {}", config.store.endpoint);
                println!("  Total vectors: {}", stats.total_vectors);
                if stats.dimension > 0 {
                    println!("  Dimension: {}", stats.dimension);
                }
                for (namespace, count) in &stats.namespaces {
                    println!("  Namespace '{}': {} vectors", namespace, count);
                }
            }
            Err(e) => println!("  Unreachable: {}", e),
        },
        Err(e) => println!("  Misconfigured: {}", e),
    }

    Ok(())
}

/// Print the active configuration as TOML.
#[inline]
pub fn show_config(config_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_dir)?;
    let rendered =
        toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

/// Write the current (or default) configuration to disk so it can be
/// edited by hand.
#[inline]
pub fn init_config(config_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_dir)?;
    config.save()?;
    println!(
        "Configuration written to {}",
        config.base_dir.join("config.toml").display()
    );
    Ok(())
}
