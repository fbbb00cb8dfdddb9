// Metadata normalization
// Collapses heterogeneous source attributes into the flat key/value schema
// the vector store can filter on: strings, booleans, and string lists only.


use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::chunking::TextChunk;
use crate::documents::SourceType;
use crate::{LandmarkError, Result};

/// Scalar values permitted in vector-record metadata. Everything is
/// coerced to a string except booleans, which keep their own filter
/// semantics in the store, plus homogeneous string lists for membership
/// filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Text(String),
    TextList(Vec<String>),
}

impl MetadataValue {
    #[inline]
    pub fn text(value: impl Into<String>) -> Self {
        MetadataValue::Text(value.into())
    }
}

/// Flat metadata mapping persisted alongside an embedding.
pub type FlatMetadata = BTreeMap<String, MetadataValue>;

/// Store-imposed metadata limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetadataLimits {
    /// Maximum characters per string field before truncation
    pub max_field_length: usize,
    /// Per-record ceiling on serialized metadata bytes
    pub max_metadata_bytes: usize,
    /// Maximum number of metadata fields per record
    pub max_metadata_fields: usize,
}

impl Default for MetadataLimits {
    #[inline]
    fn default() -> Self {
        Self {
            max_field_length: 2000,
            max_metadata_bytes: 40_960,
            max_metadata_fields: 256,
        }
    }
}

/// Read access to a document's structured attributes. The source layer
/// returns either a raw mapping or a typed record; the normalizer depends
/// only on this capability.
pub trait AttributeReader {
    /// Look up a single attribute by name.
    fn get(&self, field: &str) -> Option<Value>;

    /// Attribute names in stable order.
    fn field_names(&self) -> Vec<String>;
}

/// Mapping-backed reader over a JSON object.
#[derive(Debug, Clone, Copy)]
pub struct MappingReader<'a> {
    attributes: &'a Map<String, Value>,
}

impl<'a> MappingReader<'a> {
    #[inline]
    pub fn new(attributes: &'a Map<String, Value>) -> Self {
        Self { attributes }
    }
}

impl AttributeReader for MappingReader<'_> {
    #[inline]
    fn get(&self, field: &str) -> Option<Value> {
        self.attributes.get(field).cloned()
    }

    #[inline]
    fn field_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }
}

/// Attribute-backed reader over any serializable record type.
#[derive(Debug, Clone)]
pub struct RecordReader {
    attributes: Map<String, Value>,
}

impl RecordReader {
    #[inline]
    pub fn new<T: Serialize>(record: &T) -> Result<Self> {
        match serde_json::to_value(record) {
            Ok(Value::Object(attributes)) => Ok(Self { attributes }),
            Ok(other) => Err(LandmarkError::Config(format!(
                "attribute record must serialize to an object, got {}",
                value_kind(&other)
            ))),
            Err(e) => Err(LandmarkError::Config(format!(
                "failed to serialize attribute record: {}",
                e
            ))),
        }
    }
}

impl AttributeReader for RecordReader {
    #[inline]
    fn get(&self, field: &str) -> Option<Value> {
        self.attributes.get(field).cloned()
    }

    #[inline]
    fn field_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }
}

/// Identity of the chunk being normalized, carried into every record and
/// into overflow errors.
#[derive(Debug, Clone)]
pub struct ChunkContext<'a> {
    pub document_id: &'a str,
    pub source_type: SourceType,
    pub title: &'a str,
}

/// Normalize a document's attributes plus one chunk into flat metadata.
///
/// Repeated sub-record collections become indexed scalar fields
/// (`building_0_name`) plus a parallel `building_names` list. Null and
/// empty values are omitted. Oversized string fields are truncated and
/// listed under `truncated_fields`. If the serialized result still exceeds
/// the store ceiling, this is a data-quality error and is not retried.
#[inline]
pub fn normalize_metadata(
    reader: &dyn AttributeReader,
    ctx: &ChunkContext<'_>,
    chunk: &TextChunk,
    limits: &MetadataLimits,
) -> Result<FlatMetadata> {
    let mut flat = FlatMetadata::new();

    for field in reader.field_names() {
        if let Some(value) = reader.get(&field) {
            flatten_value(&mut flat, &field, &value);
        }
    }

    // Core fields written last so attribute flattening can never clobber them
    flat.insert(
        "source_type".to_string(),
        MetadataValue::text(ctx.source_type.as_str()),
    );
    flat.insert(
        "document_id".to_string(),
        MetadataValue::text(ctx.document_id),
    );
    flat.insert(
        "chunk_index".to_string(),
        MetadataValue::text(chunk.chunk_index.to_string()),
    );
    flat.insert("title".to_string(), MetadataValue::text(ctx.title));
    flat.insert("text".to_string(), MetadataValue::text(&chunk.text));

    apply_truncation(&mut flat, limits.max_field_length);

    let size = serialized_size(&flat);
    if size > limits.max_metadata_bytes || flat.len() > limits.max_metadata_fields {
        return Err(LandmarkError::MetadataOverflow {
            document_id: ctx.document_id.to_string(),
            chunk_index: chunk.chunk_index,
            size,
            limit: limits.max_metadata_bytes,
        });
    }

    debug!(
        "Normalized {} metadata fields ({} bytes) for {} chunk {}",
        flat.len(),
        size,
        ctx.document_id,
        chunk.chunk_index
    );

    Ok(flat)
}

/// Serialized size of a flat metadata mapping in bytes.
#[inline]
pub fn serialized_size(metadata: &FlatMetadata) -> usize {
    serde_json::to_string(metadata).map_or(0, |s| s.len())
}

fn flatten_value(out: &mut FlatMetadata, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            out.insert(key.to_string(), MetadataValue::Bool(*b));
        }
        Value::Number(n) => {
            out.insert(key.to_string(), MetadataValue::text(n.to_string()));
        }
        Value::String(s) => {
            if !s.trim().is_empty() {
                out.insert(key.to_string(), MetadataValue::text(s.as_str()));
            }
        }
        Value::Object(map) => {
            for (sub_key, sub_value) in map {
                flatten_value(out, &format!("{}_{}", key, sub_key), sub_value);
            }
        }
        Value::Array(items) => flatten_array(out, key, items),
    }
}

fn flatten_array(out: &mut FlatMetadata, key: &str, items: &[Value]) {
    if items.is_empty() {
        return;
    }

    if items.iter().all(Value::is_object) {
        flatten_collection(out, key, items);
        return;
    }

    // Scalar list: keep as a homogeneous string list, dropping nulls
    let strings: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
    if !strings.is_empty() {
        out.insert(key.to_string(), MetadataValue::TextList(strings));
    }
}

/// Collapse a repeated sub-record collection into indexed scalar fields
/// plus a parallel `{singular}_names` list of each entry's display name.
fn flatten_collection(out: &mut FlatMetadata, key: &str, items: &[Value]) {
    let singular = singularize(key);
    let mut names = Vec::new();

    for (index, item) in items.iter().enumerate() {
        if let Value::Object(record) = item {
            for (field, value) in record {
                flatten_value(out, &format!("{}_{}_{}", singular, index, field), value);
            }
            if let Some(name) = display_name(record) {
                names.push(name);
            }
        }
    }

    if !names.is_empty() {
        out.insert(format!("{}_names", singular), MetadataValue::TextList(names));
    }
}

fn display_name(record: &Map<String, Value>) -> Option<String> {
    record
        .get("name")
        .or_else(|| record.get("title"))
        .and_then(scalar_to_string)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Strip a plural 's' so "buildings" indexes as "building_0_name".
fn singularize(key: &str) -> &str {
    if key.len() > 1 && key.ends_with('s') && !key.ends_with("ss") {
        &key[..key.len() - 1]
    } else {
        key
    }
}

/// Truncate oversized string fields in place, recording which fields were
/// cut in a `truncated_fields` audit list.
fn apply_truncation(flat: &mut FlatMetadata, max_field_length: usize) {
    let mut truncated = Vec::new();

    for (key, value) in flat.iter_mut() {
        if let MetadataValue::Text(text) = value {
            if text.chars().count() > max_field_length {
                *text = text.chars().take(max_field_length).collect();
                truncated.push(key.clone());
            }
        }
    }

    if !truncated.is_empty() {
        flat.insert(
            "truncated_fields".to_string(),
            MetadataValue::TextList(truncated),
        );
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
