//! DocQA Common Library
//!
//! Shared code for the DocQA crates including:
//! - Chat session registry and the active-document pointer
//! - The query gate that deflects under-specified questions
//! - Completion and embedding collaborator abstractions
//! - The answering pipeline (prompt template + completion call)
//! - Error types, configuration, and metrics

pub mod answer;
pub mod completion;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod gate;
pub mod metrics;
pub mod session;

// Re-export commonly used types
pub use answer::AnsweringPipeline;
pub use completion::Completer;
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use gate::{GateDecision, QueryGate};
pub use session::{ChatTurn, Role, SessionRegistry};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default completion model
pub const DEFAULT_COMPLETION_MODEL: &str = "llama3-8b-8192";

/// Default embedding model name reported by the remote provider
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
