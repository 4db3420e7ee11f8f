//! Ingestion error types

use docqa_common::errors::AppError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to remove stale entry {path}: {source}")]
    RemoveStale {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create working directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {name}: {source}")]
    WriteFile {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload batch is empty")]
    EmptyBatch,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("PDF parse error for {path}: {message}")]
    PdfParseError { path: String, message: String },

    #[error("DOCX parse error for {path}: {message}")]
    DocxParseError { path: String, message: String },

    #[error("Chunking error: {0}")]
    ChunkingError(String),

    #[error("No documents uploaded or found in fallback folder")]
    NothingToIngest,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::UnsupportedFileType(name) => AppError::UnsupportedFileType { name },
            IngestionError::InvalidFileName(name) => AppError::Validation {
                message: format!("invalid file name: {:?}", name),
                field: Some("files".to_string()),
            },
            IngestionError::NothingToIngest => AppError::NoDocuments,
            other => AppError::Ingest {
                message: other.to_string(),
            },
        }
    }
}
