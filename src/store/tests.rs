use super::*;
use crate::metadata::MetadataValue;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(endpoint: &str) -> StoreConfig {
    StoreConfig {
        endpoint: endpoint.to_string(),
        max_upsert_batch: 2,
        timeout_secs: 5,
        ..StoreConfig::default()
    }
}

fn fast_client(config: &StoreConfig) -> VectorStoreClient {
    VectorStoreClient::new(config)
        .expect("client should build")
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: 0.0,
        })
}

fn record(id: &str, document_id: &str, chunk_index: usize) -> VectorRecord {
    let mut metadata = FlatMetadata::new();
    metadata.insert(
        "document_id".to_string(),
        MetadataValue::text(document_id),
    );
    metadata.insert(
        "chunk_index".to_string(),
        MetadataValue::text(chunk_index.to_string()),
    );
    metadata.insert("text".to_string(), MetadataValue::text("chunk body"));
    VectorRecord {
        id: id.to_string(),
        values: vec![0.1, 0.2, 0.3],
        metadata,
    }
}

#[tokio::test]
async fn upsert_sends_namespace_and_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_partial_json(json!({
            "namespace": "reports",
            "vectors": [{"id": "LP-00001-chunk-0"}],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&test_config(&server.uri()));
    let records = vec![record("LP-00001-chunk-0", "LP-00001", 0)];
    let written = client
        .upsert("reports", &records)
        .await
        .expect("upsert succeeds");
    assert_eq!(written, 1);
}

#[tokio::test]
async fn upsert_splits_into_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 0})))
        .expect(3)
        .mount(&server)
        .await;

    let client = fast_client(&test_config(&server.uri()));
    let records: Vec<VectorRecord> = (0..5)
        .map(|i| record(&format!("LP-00001-chunk-{}", i), "LP-00001", i))
        .collect();
    let written = client
        .upsert("reports", &records)
        .await
        .expect("upsert succeeds");
    // Server omitted counts, so the client falls back to batch sizes
    assert_eq!(written, 5);
}

#[tokio::test]
async fn oversized_metadata_is_rejected_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let config = StoreConfig {
        limits: MetadataLimits {
            max_metadata_bytes: 50,
            ..MetadataLimits::default()
        },
        ..test_config(&server.uri())
    };
    let client = fast_client(&config);
    let records = vec![record("LP-00042-chunk-3", "LP-00042", 3)];
    let err = client
        .upsert("reports", &records)
        .await
        .expect_err("should overflow");

    match err {
        LandmarkError::MetadataOverflow {
            document_id,
            chunk_index,
            ..
        } => {
            assert_eq!(document_id, "LP-00042");
            assert_eq!(chunk_index, 3);
        }
        other => panic!("expected MetadataOverflow, got {}", other),
    }
}

#[tokio::test]
async fn query_includes_filter_and_parses_matches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({
            "namespace": "articles",
            "topK": 5,
            "includeMetadata": true,
            "filter": {"source_type": {"$eq": "article"}},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                {"id": "wiki-A-LP-1-chunk-0", "score": 0.92, "metadata": {"title": "A"}},
                {"id": "wiki-B-LP-2-chunk-1", "score": 0.80, "metadata": {"title": "B"}},
            ]
        })))
        .mount(&server)
        .await;

    let client = fast_client(&test_config(&server.uri()));
    let filter = StoreFilter::new().eq("source_type", "article");
    let matches = client
        .query("articles", &[0.1, 0.2], 5, Some(&filter))
        .await
        .expect("query succeeds");

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "wiki-A-LP-1-chunk-0");
    assert!((matches[0].score - 0.92).abs() < 1e-6);
    assert_eq!(
        matches[0].metadata.get("title"),
        Some(&MetadataValue::text("A"))
    );
}

#[tokio::test]
async fn empty_filter_is_omitted_from_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matches": []})))
        .mount(&server)
        .await;

    let client = fast_client(&test_config(&server.uri()));
    let filter = StoreFilter::new();
    assert!(filter.to_json().is_none());

    let matches = client
        .query("reports", &[0.5], 10, Some(&filter))
        .await
        .expect("query succeeds");
    assert!(matches.is_empty());
}

#[test]
fn filter_renders_eq_and_in_clauses() {
    let filter = StoreFilter::new()
        .eq("document_id", "LP-00001")
        .any_of("borough", vec!["Manhattan".to_string(), "Bronx".to_string()]);

    let json = filter.to_json().expect("non-empty filter");
    assert_eq!(json["document_id"], json!({"$eq": "LP-00001"}));
    assert_eq!(json["borough"], json!({"$in": ["Manhattan", "Bronx"]}));
}

#[tokio::test]
async fn delete_by_document_sends_eq_filter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/delete"))
        .and(body_partial_json(json!({
            "namespace": "reports",
            "filter": {"document_id": {"$eq": "LP-00001"}},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&test_config(&server.uri()));
    client
        .delete_by_document("reports", "LP-00001")
        .await
        .expect("delete succeeds");
}

#[tokio::test]
async fn stats_reports_namespace_counts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dimension": 1536,
            "totalVectorCount": 1200,
            "namespaces": {
                "reports": {"vectorCount": 1000},
                "articles": {"vectorCount": 200},
            }
        })))
        .mount(&server)
        .await;

    let client = fast_client(&test_config(&server.uri()));
    let stats = client.stats().await.expect("stats succeeds");

    assert_eq!(stats.total_vectors, 1200);
    assert_eq!(stats.dimension, 1536);
    assert_eq!(stats.namespaces.get("reports"), Some(&1000));
    assert_eq!(stats.namespaces.get("articles"), Some(&200));
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matches": []})))
        .mount(&server)
        .await;

    let client = fast_client(&test_config(&server.uri()));
    assert!(client.query("reports", &[0.1], 3, None).await.is_ok());
}

#[tokio::test]
async fn api_key_header_is_attached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .and(header("Api-Key", "store-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let config = StoreConfig {
        api_key: Some("store-secret".to_string()),
        ..test_config(&server.uri())
    };
    let client = fast_client(&config);
    assert!(client.ping().await.is_ok());
}
