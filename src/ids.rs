//! Deterministic vector-id assignment.
//!
//! Ids derive purely from (source type, document id, chunk index, article
//! title), so re-ingesting a document upserts over its prior records
//! instead of accumulating duplicates. No randomness, no timestamps.

use crate::documents::SourceType;

/// Assign the vector id for a chunk.
///
/// Report chunks: `"{document_id}-chunk-{chunk_index}"`.
/// Article chunks: `"wiki-{sanitized_title}-{document_id}-chunk-{chunk_index}"`.
#[inline]
pub fn assign_id(
    source_type: SourceType,
    document_id: &str,
    chunk_index: usize,
    article_title: Option<&str>,
) -> String {
    match source_type {
        SourceType::Report => format!("{}-chunk-{}", document_id, chunk_index),
        SourceType::Article => {
            let title = sanitize_title(article_title.unwrap_or_default());
            format!("wiki-{}-{}-chunk-{}", title, document_id, chunk_index)
        }
    }
}

/// Replace whitespace with underscores and strip characters outside
/// `[A-Za-z0-9_-]`.
#[inline]
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                Some(c)
            } else {
                None
            }
        })
        .collect()
}
