use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    config.validate().expect("default config should validate");
    assert_eq!(config.embedding.dimension, DEFAULT_EMBEDDING_DIMENSION);
    assert_eq!(config.ingestion.parallel_width, 4);
}

#[test]
fn load_without_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = Config::load(temp_dir.path()).expect("load should succeed");

    assert_eq!(config.embedding, EmbeddingConfig::default());
    assert_eq!(config.base_dir, temp_dir.path());
}

#[test]
fn config_file_persistence() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");

    let mut original = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    original.embedding.model = "custom-embedding-model".to_string();
    original.embedding.dimension = 768;
    original.store.report_namespace = "landmark-reports".to_string();
    original.ingestion.parallel_width = 8;

    original.save().expect("save should succeed");

    let loaded = Config::load(temp_dir.path()).expect("load should succeed");
    assert_eq!(loaded.embedding.model, "custom-embedding-model");
    assert_eq!(loaded.embedding.dimension, 768);
    assert_eq!(loaded.store.report_namespace, "landmark-reports");
    assert_eq!(loaded.ingestion.parallel_width, 8);
}

#[test]
fn invalid_toml_is_rejected() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(temp_dir.path().join("config.toml"), "[embedding\nmodel = 3")
        .expect("should write config file");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn invalid_values_fail_validation_on_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[embedding]\ndimension = 7\n",
    )
    .expect("should write config file");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn embedding_validation_bounds() {
    let mut config = EmbeddingConfig::default();

    config.dimension = 63;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidEmbeddingDimension(63))
    ));

    config = EmbeddingConfig {
        batch_size: 0,
        ..EmbeddingConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidBatchSize(0))
    ));

    config = EmbeddingConfig {
        model: "  ".to_string(),
        ..EmbeddingConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidModel)));

    config = EmbeddingConfig {
        endpoint: "not a url".to_string(),
        ..EmbeddingConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidUrl(_, _))
    ));
}

#[test]
fn store_validation_bounds() {
    let config = StoreConfig {
        report_namespace: String::new(),
        ..StoreConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidNamespace)
    ));

    let config = StoreConfig {
        max_upsert_batch: 0,
        ..StoreConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidUpsertBatch(0))
    ));
}

#[test]
fn ingestion_validation_bounds() {
    let config = IngestionConfig {
        parallel_width: 0,
        ..IngestionConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidParallelWidth(0))
    ));

    let config = IngestionConfig {
        retry: RetryConfig {
            jitter: 1.5,
            ..RetryConfig::default()
        },
        ..IngestionConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidJitter(_))));
}

#[test]
fn namespace_routing_by_source_type() {
    let config = StoreConfig::default();
    assert_eq!(config.namespace_for(SourceType::Report), "reports");
    assert_eq!(config.namespace_for(SourceType::Article), "articles");
}

#[test]
fn retry_config_converts_to_policy() {
    let retry = RetryConfig {
        max_attempts: 5,
        base_delay_ms: 250,
        max_delay_ms: 4000,
        jitter: 0.1,
    };
    let policy = retry.policy();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.base_delay, Duration::from_millis(250));
    assert_eq!(policy.max_delay, Duration::from_millis(4000));
}
