//! Retrieval collaborator
//!
//! A [`Retriever`] turns a directory of documents into a queryable
//! [`IndexHandle`]. The handle answers a question with the most relevant
//! passages, already joined into a single context string.

mod format;
mod vector;

pub use format::{format_context, NO_CONTEXT_NOTICE};
pub use vector::{dot_similarity, VectorIndex, VectorRetriever};

use async_trait::async_trait;
use docqa_common::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Retrieved chunk with relevance score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    /// File the chunk was read from
    pub source: String,

    /// Chunk index within its file
    pub chunk_index: usize,

    /// Chunk content
    pub content: String,

    /// Cosine similarity to the question
    pub score: f32,
}

/// Result of querying an index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Context text handed to the answering pipeline
    pub response: String,

    /// Chunks the context was built from, best first
    pub sources: Vec<RetrievedChunk>,
}

/// Builds an index over a directory
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Read, chunk, and index every document in `dir`
    async fn build_index(&self, dir: &Path) -> Result<Arc<dyn IndexHandle>>;
}

/// A built index
#[async_trait]
pub trait IndexHandle: Send + Sync {
    /// Return the context most relevant to `question`
    async fn query(&self, question: &str) -> Result<QueryResponse>;

    /// Number of indexed chunks
    fn chunk_count(&self) -> usize;
}
