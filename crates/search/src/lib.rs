//! DocQA Search
//!
//! Retrieval collaborator backed by an in-memory vector index.

pub mod retrieval;

pub use retrieval::{
    format_context, IndexHandle, QueryResponse, RetrievedChunk, Retriever, VectorIndex,
    VectorRetriever,
};
