//! Text chunking module
//!
//! Splits document text into overlapping chunks for embedding.

use crate::errors::IngestionError;
use docqa_common::config::RetrievalConfig;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
    /// Chunks shorter than this are dropped, unless a document yields only one
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for ChunkingConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            min_chunk_size: config.min_chunk_size,
        }
    }
}

/// A text chunk with its position in the source text
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The chunk content
    pub content: String,
    /// Index of this chunk in the document
    pub index: usize,
    /// Start byte offset in original text
    pub start_pos: usize,
    /// End byte offset in original text
    pub end_pos: usize,
}

/// Split text into chunks for embedding
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, IngestionError> {
    let chunk_config = ChunkConfig::new(config.chunk_size)
        .with_overlap(config.chunk_overlap)
        .map_err(|e| IngestionError::ChunkingError(e.to_string()))?;
    let splitter = TextSplitter::new(chunk_config);

    let raw: Vec<(usize, &str)> = splitter
        .chunk_indices(text)
        .filter(|(_, chunk)| !chunk.trim().is_empty())
        .collect();

    // A short document is still a document
    let keep_all = raw.len() == 1;

    let chunks: Vec<TextChunk> = raw
        .into_iter()
        .filter(|(_, chunk)| keep_all || chunk.trim().len() >= config.min_chunk_size)
        .enumerate()
        .map(|(index, (start_pos, chunk))| TextChunk {
            content: chunk.to_string(),
            index,
            start_pos,
            end_pos: start_pos + chunk.len(),
        })
        .collect();

    debug!(
        input_len = text.len(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
            min_chunk_size,
        }
    }

    #[test]
    fn test_basic_chunking() {
        let text = "This is a test. ".repeat(100);
        let config = config(200, 50, 50);

        let chunks = chunk_text(&text, &config).unwrap();
        assert!(chunks.len() > 1);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(chunk.content.len() <= 200);
            assert!(chunk.content.trim().len() >= config.min_chunk_size);
            assert_eq!(&text[chunk.start_pos..chunk.end_pos], chunk.content);
        }
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("Milestone A is due in May.", &config(1000, 200, 5)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_pos, 0);
    }

    #[test]
    fn test_single_short_chunk_is_kept() {
        let chunks = chunk_text("Budget is 5M.", &config(1000, 0, 20)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Budget is 5M.");
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        let chunks = chunk_text("  \n\t ", &config(1000, 0, 1)).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_tiny_trailing_chunk_is_dropped() {
        let text = format!("{} ok", "word ".repeat(30).trim_end());
        let chunks = chunk_text(&text, &config(150, 0, 20)).unwrap();

        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.content.trim().len() >= 20));
    }

    #[test]
    fn test_overlap_larger_than_size_is_rejected() {
        let err = chunk_text("text", &config(10, 20, 1)).unwrap_err();
        assert!(matches!(err, IngestionError::ChunkingError(_)));
    }
}
