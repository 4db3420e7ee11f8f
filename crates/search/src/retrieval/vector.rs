//! In-memory vector index
//!
//! Chunks are embedded once at build time and kept L2-normalised, so a
//! dot product against the normalised question vector is cosine similarity.

use super::{format_context, IndexHandle, QueryResponse, RetrievedChunk, Retriever};
use async_trait::async_trait;
use docqa_common::embeddings::{normalize, Embedder};
use docqa_common::errors::{AppError, Result};
use docqa_common::metrics;
use docqa_ingestion::{chunk_text, load_directory, ChunkingConfig};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Dot product similarity. On normalised vectors this equals cosine similarity.
pub fn dot_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// A chunk of text waiting to be embedded
struct PendingChunk {
    source: String,
    chunk_index: usize,
    content: String,
}

struct IndexEntry {
    source: String,
    chunk_index: usize,
    content: String,
    vector: Vec<f32>,
}

/// Min-heap entry for top-K selection
#[derive(Debug)]
struct HeapEntry {
    score: f32,
    position: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the lowest score sits on top; ties keep the earlier chunk
        match other.score.partial_cmp(&self.score) {
            Some(Ordering::Equal) | None => self.position.cmp(&other.position),
            Some(ord) => ord,
        }
    }
}

/// Builds [`VectorIndex`]es from directories
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    top_k: usize,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig, top_k: usize) -> Self {
        Self {
            embedder,
            chunking,
            top_k: top_k.max(1),
        }
    }

    /// Read and chunk every document in `dir` on the blocking pool
    async fn collect_chunks(&self, dir: &Path) -> Result<Vec<PendingChunk>> {
        let dir: PathBuf = dir.to_path_buf();
        let chunking = self.chunking.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<PendingChunk>> {
            let mut pending = Vec::new();
            for document in load_directory(&dir)? {
                for chunk in chunk_text(&document.text, &chunking)? {
                    pending.push(PendingChunk {
                        source: document.name.clone(),
                        chunk_index: chunk.index,
                        content: chunk.content,
                    });
                }
            }
            Ok(pending)
        })
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Document loading task failed: {}", e),
        })?
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn build_index(&self, dir: &Path) -> Result<Arc<dyn IndexHandle>> {
        let start = Instant::now();
        let pending = self.collect_chunks(dir).await?;

        if pending.is_empty() {
            return Err(AppError::NoDocuments);
        }

        let texts: Vec<String> = pending.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != pending.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Expected {} embeddings, got {}",
                    pending.len(),
                    vectors.len()
                ),
            });
        }

        let entries: Vec<IndexEntry> = pending
            .into_iter()
            .zip(vectors)
            .map(|(chunk, mut vector)| {
                normalize(&mut vector);
                IndexEntry {
                    source: chunk.source,
                    chunk_index: chunk.chunk_index,
                    content: chunk.content,
                    vector,
                }
            })
            .collect();

        info!(
            dir = %dir.display(),
            chunks = entries.len(),
            model = self.embedder.model_name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Index built"
        );

        Ok(Arc::new(VectorIndex {
            embedder: self.embedder.clone(),
            entries,
            top_k: self.top_k,
        }))
    }
}

/// Queryable in-memory index over one directory
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<IndexEntry>,
    top_k: usize,
}

impl VectorIndex {
    /// Top-K chunks by similarity to a normalised query vector, best first
    fn search(&self, query_vector: &[f32]) -> Vec<RetrievedChunk> {
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(self.top_k + 1);

        for (position, entry) in self.entries.iter().enumerate() {
            let score = dot_similarity(query_vector, &entry.vector);
            if !score.is_finite() {
                continue;
            }

            heap.push(HeapEntry { score, position });
            if heap.len() > self.top_k {
                heap.pop();
            }
        }

        // Ascending in heap order is best first
        heap.into_sorted_vec()
            .into_iter()
            .map(|hit| {
                let entry = &self.entries[hit.position];
                RetrievedChunk {
                    source: entry.source.clone(),
                    chunk_index: entry.chunk_index,
                    content: entry.content.clone(),
                    score: hit.score,
                }
            })
            .collect()
    }
}

#[async_trait]
impl IndexHandle for VectorIndex {
    async fn query(&self, question: &str) -> Result<QueryResponse> {
        let start = Instant::now();

        let mut query_vector = self.embedder.embed(question).await?;
        normalize(&mut query_vector);

        let sources = self.search(&query_vector);
        metrics::record_retrieval(start.elapsed().as_secs_f64(), sources.len());
        debug!(hits = sources.len(), "Index queried");

        Ok(QueryResponse {
            response: format_context(&sources),
            sources,
        })
    }

    fn chunk_count(&self) -> usize {
        self.entries.len()
    }
}
