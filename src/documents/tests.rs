use super::*;
use serde_json::json;
use tempfile::TempDir;

fn sample_document(id: &str) -> Document {
    Document {
        document_id: id.to_string(),
        source_type: SourceType::Report,
        title: "Old Stone House".to_string(),
        raw_text: "A designation report for the Old Stone House.".to_string(),
        structured_attributes: json!({"borough": "Brooklyn"})
            .as_object()
            .expect("object literal")
            .clone(),
        revision_marker: Some("rev-1".to_string()),
    }
}

#[test]
fn source_type_round_trips_through_str() {
    assert_eq!("report".parse::<SourceType>(), Ok(SourceType::Report));
    assert_eq!("article".parse::<SourceType>(), Ok(SourceType::Article));
    assert!("pdf".parse::<SourceType>().is_err());
    assert_eq!(SourceType::Report.to_string(), "report");
}

#[tokio::test]
async fn in_memory_source_fetches_by_id() {
    let source = InMemorySource::new([sample_document("LP-00001"), sample_document("LP-00002")]);

    let doc = source.fetch("LP-00001").await.expect("document exists");
    assert_eq!(doc.document_id, "LP-00001");

    let ids = source.list_ids().await.expect("listing succeeds");
    assert_eq!(ids, vec!["LP-00001", "LP-00002"]);
}

#[tokio::test]
async fn in_memory_source_distinguishes_not_found() {
    let source = InMemorySource::new([sample_document("LP-00001")]);
    let err = source.fetch("LP-99999").await.expect_err("missing id");
    assert!(matches!(err, FetchError::NotFound(_)));
}

#[tokio::test]
async fn json_directory_source_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let doc = sample_document("LP-00001");
    let path = dir.path().join("LP-00001.json");
    std::fs::write(&path, serde_json::to_string(&doc).expect("serialize")).expect("write");

    let source = JsonDirectorySource::new(dir.path());
    let loaded = source.fetch("LP-00001").await.expect("document loads");
    assert_eq!(loaded.document_id, "LP-00001");
    assert_eq!(loaded.title, "Old Stone House");
    assert_eq!(loaded.revision_marker.as_deref(), Some("rev-1"));

    let ids = source.list_ids().await.expect("listing succeeds");
    assert_eq!(ids, vec!["LP-00001"]);
}

#[tokio::test]
async fn json_directory_source_missing_file_is_not_found() {
    let dir = TempDir::new().expect("temp dir");
    let source = JsonDirectorySource::new(dir.path());
    let err = source.fetch("LP-00404").await.expect_err("missing file");
    assert!(matches!(err, FetchError::NotFound(_)));
}

#[tokio::test]
async fn json_directory_source_malformed_file_is_permanent() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("LP-00001.json"), "{not json").expect("write");

    let source = JsonDirectorySource::new(dir.path());
    let err = source.fetch("LP-00001").await.expect_err("malformed file");
    assert!(matches!(err, FetchError::Permanent(_)));
}
