//! DocQA Ingestion
//!
//! Owns the upload working directory and turns files on disk into
//! chunked text:
//! - Document store with fallback folder selection
//! - PDF, DOCX, and plain text extraction
//! - Overlapping text chunking

pub mod chunker;
pub mod docx;
pub mod errors;
pub mod pdf;
pub mod reader;
pub mod store;

pub use chunker::{chunk_text, ChunkingConfig, TextChunk};
pub use errors::IngestionError;
pub use reader::{extract_text, load_directory, LoadedDocument};
pub use store::{
    DocumentStore, IngestOutcome, SourceSelection, UploadedFile, WrittenFile, ALLOWED_EXTENSIONS,
};
