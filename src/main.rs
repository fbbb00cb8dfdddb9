use clap::{Parser, Subcommand};
use landmark_index::Result;
use landmark_index::commands::{ingest, init_config, search, show_config, show_status};
use landmark_index::documents::SourceType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "landmark-index")]
#[command(about = "Chunk, embed, and index landmark documents for semantic search")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to the user config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the configuration
    Config {
        /// Write the active configuration to disk
        #[arg(long)]
        init: bool,
    },
    /// Ingest extracted documents into the vector index
    Ingest {
        /// Directory containing one JSON document per file
        docs_dir: PathBuf,
        /// Specific document ids to ingest (defaults to every document in
        /// the directory)
        #[arg(long = "id")]
        ids: Vec<String>,
        /// Delete each document's existing vectors before re-indexing
        #[arg(long)]
        force: bool,
        /// Worker pool width for this run (overrides the configured value)
        #[arg(long)]
        parallel: Option<usize>,
    },
    /// Search the index
    Search {
        /// Natural-language query
        query: String,
        /// Number of results to return
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Restrict to one source type ("report" or "article")
        #[arg(long)]
        source: Option<SourceType>,
        /// Restrict to one document id
        #[arg(long)]
        document: Option<String>,
        /// Return at most one chunk per document
        #[arg(long)]
        best_per_document: bool,
    },
    /// Show service health and index statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir;

    match cli.command {
        Commands::Config { init } => {
            if init {
                init_config(config_dir)?;
            } else {
                show_config(config_dir)?;
            }
        }
        Commands::Ingest {
            docs_dir,
            ids,
            force,
            parallel,
        } => {
            ingest(docs_dir, ids, force, parallel, config_dir).await?;
        }
        Commands::Search {
            query,
            top_k,
            source,
            document,
            best_per_document,
        } => {
            search(query, top_k, source, document, best_per_document, config_dir).await?;
        }
        Commands::Status => {
            show_status(config_dir).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["landmark-index", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn ingest_command_with_directory() {
        let cli = Cli::try_parse_from(["landmark-index", "ingest", "./docs"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest {
                docs_dir,
                ids,
                force,
                parallel,
            } = parsed.command
            {
                assert_eq!(docs_dir, PathBuf::from("./docs"));
                assert!(ids.is_empty());
                assert!(!force);
                assert_eq!(parallel, None);
            }
        }
    }

    #[test]
    fn ingest_command_with_ids_and_force() {
        let cli = Cli::try_parse_from([
            "landmark-index",
            "ingest",
            "./docs",
            "--id",
            "LP-00001",
            "--id",
            "LP-00002",
            "--force",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { ids, force, .. } = parsed.command {
                assert_eq!(ids, vec!["LP-00001", "LP-00002"]);
                assert!(force);
            }
        }
    }

    #[test]
    fn search_command_with_filters() {
        let cli = Cli::try_parse_from([
            "landmark-index",
            "search",
            "cast iron facades",
            "--top-k",
            "5",
            "--source",
            "report",
            "--best-per-document",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                query,
                top_k,
                source,
                best_per_document,
                ..
            } = parsed.command
            {
                assert_eq!(query, "cast iron facades");
                assert_eq!(top_k, 5);
                assert_eq!(source, Some(SourceType::Report));
                assert!(best_per_document);
            }
        }
    }

    #[test]
    fn search_rejects_unknown_source() {
        let cli = Cli::try_parse_from([
            "landmark-index",
            "search",
            "query",
            "--source",
            "webpage",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn config_init_flag() {
        let cli = Cli::try_parse_from(["landmark-index", "config", "--init"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { init } = parsed.command {
                assert!(init);
            }
        }
    }

    #[test]
    fn global_config_dir_flag() {
        let cli = Cli::try_parse_from([
            "landmark-index",
            "--config-dir",
            "/tmp/landmark",
            "status",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/landmark")));
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["landmark-index", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["landmark-index", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
