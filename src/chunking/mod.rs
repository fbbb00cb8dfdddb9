
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{LandmarkError, Result};

/// A contiguous span of document text, sized for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk text
    pub text: String,
    /// 0-based position of this chunk within the document, contiguous with no gaps
    pub chunk_index: usize,
    /// Character offset of the first character, for traceability
    pub char_start: usize,
    /// Character offset one past the last character
    pub char_end: usize,
}

/// Configuration for text chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub max_chunk_size: usize,
    /// Overlap in characters carried from the end of one chunk into the next
    pub overlap_size: usize,
    /// How far below `max_chunk_size` the splitter may pull a chunk back
    /// to land on a paragraph or sentence boundary
    pub boundary_tolerance: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap_size: 200,
            boundary_tolerance: 150,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(LandmarkError::Config(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(LandmarkError::Config(format!(
                "overlap_size ({}) must be smaller than max_chunk_size ({})",
                self.overlap_size, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

/// Split document text into overlapping chunks of at most
/// `config.max_chunk_size` characters.
///
/// Greedy forward split: each chunk prefers to end on a paragraph or
/// sentence boundary within `boundary_tolerance` characters of the size
/// limit, and hard-splits at the limit when no boundary is found. Every
/// chunk after the first starts exactly `overlap_size` characters before
/// the previous chunk's end, so concatenating the non-overlapping portions
/// reconstructs the original text.
///
/// Empty input produces zero chunks; any other text, including pure
/// whitespace, is chunked as-is so reconstruction holds. Pure function, no
/// side effects.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    config.validate()?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    // Byte offset of every char boundary, so slicing stays UTF-8 safe
    let byte_offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = chars.len();

    // Keep the tolerance window from reaching back into the overlap region,
    // otherwise a boundary split could fail to make forward progress.
    let tolerance = config
        .boundary_tolerance
        .min(config.max_chunk_size - config.overlap_size - 1);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        if total - start <= config.max_chunk_size {
            push_chunk(&mut chunks, text, &byte_offsets, start, total);
            break;
        }

        let hard_end = start + config.max_chunk_size;
        let earliest = hard_end - tolerance;
        let end = find_split_point(&chars, earliest, hard_end);
        push_chunk(&mut chunks, text, &byte_offsets, start, end);
        start = end - config.overlap_size;
    }

    debug!(
        "Chunked {} chars into {} chunks (max {}, overlap {})",
        total,
        chunks.len(),
        config.max_chunk_size,
        config.overlap_size
    );

    Ok(chunks)
}

fn push_chunk(
    chunks: &mut Vec<TextChunk>,
    text: &str,
    byte_offsets: &[usize],
    start: usize,
    end: usize,
) {
    let slice = text
        .get(byte_offsets[start]..byte_offsets[end])
        .unwrap_or_default();
    chunks.push(TextChunk {
        text: slice.to_string(),
        chunk_index: chunks.len(),
        char_start: start,
        char_end: end,
    });
}

/// Find the best split point in `[earliest, hard_end]`, preferring the
/// latest paragraph/newline boundary, then the latest sentence boundary,
/// falling back to a hard split at `hard_end`.
fn find_split_point(chars: &[char], earliest: usize, hard_end: usize) -> usize {
    let mut sentence_split = None;

    for p in (earliest..=hard_end).rev() {
        if p >= 1 && chars[p - 1] == '\n' {
            return p;
        }
        if sentence_split.is_none()
            && p >= 2
            && chars[p - 1].is_whitespace()
            && matches!(chars[p - 2], '.' | '!' | '?')
        {
            sentence_split = Some(p);
        }
    }

    sentence_split.unwrap_or(hard_end)
}
