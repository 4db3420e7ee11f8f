//! Interaction orchestrator
//!
//! Ties the document store, retrieval index, query gate, answering pipeline,
//! and session registry together. One `Assistant` serves one user; callers
//! serialise access to it.

use docqa_common::{
    answer::AnsweringPipeline,
    errors::{AppError, Result},
    gate::{GateDecision, QueryGate, DEFLECTION_NOTICE},
    metrics,
    session::{ChatTurn, HistoryTarget, SessionRegistry},
};
use docqa_ingestion::{DocumentStore, SourceSelection, UploadedFile, WrittenFile};
use docqa_search::{IndexHandle, RetrievedChunk, Retriever};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Notice returned after a successful upload
pub const UPLOAD_NOTICE: &str = "Documents processed and indexed!";

/// Where the current index was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Uploaded,
    Fallback,
}

impl SourceMode {
    fn history_target(self) -> HistoryTarget {
        match self {
            SourceMode::Uploaded => HistoryTarget::Active,
            SourceMode::Fallback => HistoryTarget::Anonymous,
        }
    }
}

struct IndexedSource {
    mode: SourceMode,
    dir: PathBuf,
    index: Arc<dyn IndexHandle>,
}

/// Result of an upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub message: String,
    pub mode: SourceMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_document: Option<String>,
    pub files: Vec<WrittenFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<String>,
    pub chunks_indexed: usize,
}

/// Result of asking a question
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AskOutcome {
    Deflected {
        notice: String,
        examples: Vec<String>,
    },
    Answered {
        answer: String,
        sources: Vec<RetrievedChunk>,
    },
}

/// Sidebar listing
#[derive(Debug, Clone, Serialize)]
pub struct DocumentList {
    pub documents: Vec<String>,
    pub active: Option<String>,
}

/// Readiness snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub mode: SourceMode,
    pub dir: PathBuf,
    pub chunks: usize,
}

pub struct Assistant {
    store: DocumentStore,
    retriever: Arc<dyn Retriever>,
    pipeline: AnsweringPipeline,
    gate: QueryGate,
    registry: SessionRegistry,
    source: Option<IndexedSource>,
}

impl Assistant {
    pub fn new(
        store: DocumentStore,
        retriever: Arc<dyn Retriever>,
        pipeline: AnsweringPipeline,
    ) -> Self {
        Self {
            store,
            retriever,
            pipeline,
            gate: QueryGate::new(),
            registry: SessionRegistry::new(),
            source: None,
        }
    }

    /// Replace the working directory with `files` (or fall back to the
    /// pre-seeded folder when `files` is empty) and rebuild the index.
    pub async fn upload(&mut self, files: Vec<UploadedFile>) -> Result<UploadSummary> {
        let start = Instant::now();
        let store = self.store.clone();

        let selection = tokio::task::spawn_blocking(move || store.prepare(&files))
            .await
            .map_err(|e| AppError::Internal {
                message: format!("Upload task failed: {}", e),
            })??;

        let built = self.retriever.build_index(selection.dir()).await;
        let index = match built {
            Ok(index) => index,
            Err(e) => return Err(self.abandon_batch(selection, e).await),
        };
        let chunks_indexed = index.chunk_count();

        let summary = match selection {
            SourceSelection::Uploaded(outcome) => {
                self.registry.activate(&outcome.active_document);
                metrics::record_ingestion(
                    start.elapsed().as_secs_f64(),
                    outcome.files.len(),
                    chunks_indexed,
                );
                info!(
                    document = %outcome.active_document,
                    files = outcome.files.len(),
                    chunks = chunks_indexed,
                    "Documents processed and indexed"
                );

                self.source = Some(IndexedSource {
                    mode: SourceMode::Uploaded,
                    dir: outcome.dir,
                    index,
                });
                UploadSummary {
                    message: UPLOAD_NOTICE.to_string(),
                    mode: SourceMode::Uploaded,
                    active_document: Some(outcome.active_document),
                    files: outcome.files,
                    duplicates: outcome.duplicates,
                    chunks_indexed,
                }
            }
            SourceSelection::Fallback { dir } => {
                info!(dir = %dir.display(), chunks = chunks_indexed, "Fallback folder indexed");
                self.source = Some(IndexedSource {
                    mode: SourceMode::Fallback,
                    dir,
                    index,
                });
                UploadSummary {
                    message: UPLOAD_NOTICE.to_string(),
                    mode: SourceMode::Fallback,
                    active_document: None,
                    files: Vec::new(),
                    duplicates: Vec::new(),
                    chunks_indexed,
                }
            }
        };

        Ok(summary)
    }

    /// Bring state back in line with disk after indexing a written batch failed.
    ///
    /// The batch is activated, since ingestion completed, but nothing is left
    /// queryable: the previous index is dropped and the working directory is
    /// released.
    async fn abandon_batch(&mut self, selection: SourceSelection, error: AppError) -> AppError {
        let SourceSelection::Uploaded(outcome) = selection else {
            return error;
        };

        self.registry.activate(&outcome.active_document);
        self.source = None;

        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.release()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to release unindexed batch"),
            Err(e) => warn!(error = %e, "Release task failed"),
        }

        let names: Vec<&str> = outcome.files.iter().map(|f| f.name.as_str()).collect();
        warn!(files = ?names, error = %error, "Uploaded batch could not be indexed");

        match error {
            AppError::NoDocuments => AppError::ingest(format!(
                "no readable text in uploaded files: {}",
                names.join(", ")
            )),
            other => other,
        }
    }

    /// Index the fallback folder if nothing has been indexed yet
    async fn ensure_source(&mut self) -> Result<()> {
        if self.source.is_some() {
            return Ok(());
        }

        let store = self.store.clone();
        let fallback = tokio::task::spawn_blocking(move || store.fallback_source())
            .await
            .map_err(|e| AppError::Internal {
                message: format!("Fallback lookup failed: {}", e),
            })?;

        let Some(dir) = fallback else {
            warn!("Question received with no documents available");
            return Err(AppError::NoDocuments);
        };

        let index = self.retriever.build_index(&dir).await?;
        info!(dir = %dir.display(), chunks = index.chunk_count(), "Fallback folder indexed");
        self.source = Some(IndexedSource {
            mode: SourceMode::Fallback,
            dir,
            index,
        });
        Ok(())
    }

    /// Record the question, then either deflect it or answer it from the index.
    pub async fn ask(&mut self, question: &str) -> Result<AskOutcome> {
        self.ensure_source().await?;
        let (target, index) = match &self.source {
            Some(source) => (source.mode.history_target(), source.index.clone()),
            None => return Err(AppError::NoDocuments),
        };

        self.registry.record(target, ChatTurn::user(question));

        match self.gate.evaluate(question) {
            GateDecision::Deflect { examples } => {
                metrics::record_question("deflected");
                Ok(AskOutcome::Deflected {
                    notice: DEFLECTION_NOTICE.to_string(),
                    examples,
                })
            }
            GateDecision::Proceed => {
                metrics::record_question("answered");

                let retrieved = index.query(question).await.map_err(|e| match e {
                    AppError::Answer { .. } => e,
                    other => AppError::answer(format!("retrieval failed: {}", other)),
                })?;
                let answer = self.pipeline.answer(question, &retrieved.response).await?;

                self.registry.record(target, ChatTurn::assistant(answer.clone()));
                Ok(AskOutcome::Answered {
                    answer,
                    sources: retrieved.sources,
                })
            }
        }
    }

    /// Switch the active document for the history view
    pub fn select(&mut self, name: &str) -> Result<()> {
        self.registry.select(name)?;
        info!(document = %name, "Document selected");
        Ok(())
    }

    pub fn documents(&self) -> DocumentList {
        DocumentList {
            documents: self.registry.documents().to_vec(),
            active: self.registry.active_document().map(str::to_string),
        }
    }

    /// The current conversation, newest first
    pub fn history(&self) -> Vec<ChatTurn> {
        self.registry.display_history(self.history_target())
    }

    pub fn active_document(&self) -> Option<&str> {
        match self.history_target() {
            HistoryTarget::Active => self.registry.active_document(),
            HistoryTarget::Anonymous => None,
        }
    }

    fn history_target(&self) -> HistoryTarget {
        self.source
            .as_ref()
            .map_or(HistoryTarget::Active, |s| s.mode.history_target())
    }

    pub fn status(&self) -> Option<SourceStatus> {
        self.source.as_ref().map(|s| SourceStatus {
            mode: s.mode,
            dir: s.dir.clone(),
            chunks: s.index.chunk_count(),
        })
    }

    pub fn working_dir(&self) -> &Path {
        self.store.working_dir()
    }

    /// Remove the working directory
    pub fn release(&self) -> Result<()> {
        self.store.release()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_common::completion::{
        ChoiceMessage, CompletionChoice, CompletionRequest, CompletionResponse, Completer,
    };
    use docqa_common::session::Role;
    use docqa_common::embeddings::HashingEmbedder;
    use docqa_ingestion::ChunkingConfig;
    use docqa_search::{QueryResponse, VectorRetriever};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[derive(Default)]
    pub struct CountingCompleter {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    #[async_trait]
    impl Completer for CountingCompleter {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Internal {
                    message: "provider unavailable".into(),
                });
            }
            Ok(CompletionResponse {
                choices: vec![CompletionChoice {
                    message: ChoiceMessage {
                        content: Some("Phase two ends with the pilot launch.".into()),
                    },
                }],
            })
        }
    }

    #[derive(Default)]
    pub struct CountingRetriever {
        pub builds: AtomicUsize,
        pub queries: Arc<AtomicUsize>,
    }

    struct CountingIndex {
        queries: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Retriever for CountingRetriever {
        async fn build_index(&self, _dir: &Path) -> Result<Arc<dyn IndexHandle>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingIndex {
                queries: self.queries.clone(),
            }))
        }
    }

    #[async_trait]
    impl IndexHandle for CountingIndex {
        async fn query(&self, _question: &str) -> Result<QueryResponse> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(QueryResponse {
                response: "[Source: plan.pdf, chunk 0, score: 0.90]\nPilot launch in Q3.".into(),
                sources: Vec::new(),
            })
        }

        fn chunk_count(&self) -> usize {
            1
        }
    }

    pub struct Fixture {
        pub dir: TempDir,
        pub completer: Arc<CountingCompleter>,
        pub retriever: Arc<CountingRetriever>,
        pub assistant: Assistant,
    }

    pub fn fixture_with(completer: CountingCompleter) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path().join("uploaded_docs"), dir.path().join("docs"));
        let completer = Arc::new(completer);
        let retriever = Arc::new(CountingRetriever::default());
        let pipeline = AnsweringPipeline::new(completer.clone(), "llama3-8b-8192");
        let assistant = Assistant::new(store, retriever.clone(), pipeline);
        Fixture {
            dir,
            completer,
            retriever,
            assistant,
        }
    }

    pub fn fixture() -> Fixture {
        fixture_with(CountingCompleter::default())
    }

    fn pdf(name: &str) -> UploadedFile {
        UploadedFile::new(name, b"%PDF-1.4 stub".to_vec())
    }

    #[tokio::test]
    async fn test_short_question_is_deflected_without_calls() {
        let mut fx = fixture();
        fx.assistant.upload(vec![pdf("plan.pdf")]).await.unwrap();

        let outcome = fx.assistant.ask("hi").await.unwrap();
        match outcome {
            AskOutcome::Deflected { notice, examples } => {
                assert_eq!(notice, DEFLECTION_NOTICE);
                assert_eq!(examples.len(), 3);
            }
            other => panic!("expected deflection, got {:?}", other),
        }

        let history = fx.assistant.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role(), Role::User);
        assert_eq!(fx.retriever.queries.load(Ordering::SeqCst), 0);
        assert_eq!(fx.completer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_specific_question_is_answered_once() {
        let mut fx = fixture();
        fx.assistant.upload(vec![pdf("plan.pdf")]).await.unwrap();

        let question = "What are the key milestones in the NPD plan for phase two?";
        let outcome = fx.assistant.ask(question).await.unwrap();
        assert!(matches!(outcome, AskOutcome::Answered { ref answer, .. } if answer.contains("pilot")));

        assert_eq!(fx.retriever.queries.load(Ordering::SeqCst), 1);
        assert_eq!(fx.completer.calls.load(Ordering::SeqCst), 1);

        // newest first
        let history = fx.assistant.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role(), Role::Assistant);
        assert_eq!(history[1].role(), Role::User);
        assert_eq!(history[1].content(), question);
    }

    #[tokio::test]
    async fn test_no_upload_and_no_fallback_halts() {
        let mut fx = fixture();

        let err = fx.assistant.upload(Vec::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NoDocuments));

        let err = fx
            .assistant
            .ask("What are the risks mentioned in section 3?")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoDocuments));

        assert_eq!(fx.retriever.builds.load(Ordering::SeqCst), 0);
        assert_eq!(fx.completer.calls.load(Ordering::SeqCst), 0);
        assert!(fx.assistant.history().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_uses_anonymous_session() {
        let mut fx = fixture();
        let fallback = fx.dir.path().join("docs");
        fs::create_dir_all(&fallback).unwrap();
        fs::write(fallback.join("handbook.txt"), "Seeded content").unwrap();

        let outcome = fx
            .assistant
            .ask("Who approved the latest revision of it?")
            .await
            .unwrap();
        assert!(matches!(outcome, AskOutcome::Answered { .. }));

        assert_eq!(fx.assistant.status().map(|s| s.mode), Some(SourceMode::Fallback));
        assert!(fx.assistant.documents().documents.is_empty());
        assert_eq!(fx.assistant.active_document(), None);
        assert_eq!(fx.assistant.history().len(), 2);
    }

    #[tokio::test]
    async fn test_histories_are_isolated_per_document() {
        let mut fx = fixture();
        fx.assistant.upload(vec![pdf("plan.pdf")]).await.unwrap();
        fx.assistant.ask("hello there").await.unwrap();

        fx.assistant.upload(vec![pdf("risks.docx")]).await.unwrap();
        assert!(fx.assistant.history().is_empty());
        assert_eq!(fx.assistant.documents().documents, vec!["plan.pdf", "risks.docx"]);

        assert_ok!(fx.assistant.select("plan.pdf"));
        assert_eq!(fx.assistant.history().len(), 1);
        assert_eq!(fx.assistant.history()[0].content(), "hello there");
    }

    #[tokio::test]
    async fn test_reupload_keeps_history() {
        let mut fx = fixture();
        fx.assistant.upload(vec![pdf("plan.pdf")]).await.unwrap();
        fx.assistant.ask("hi").await.unwrap();
        fx.assistant.upload(vec![pdf("plan.pdf")]).await.unwrap();

        assert_eq!(fx.assistant.history().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_selection_keeps_active() {
        let mut fx = fixture();
        fx.assistant.upload(vec![pdf("plan.pdf")]).await.unwrap();

        let err = fx.assistant.select("missing.pdf").unwrap_err();
        assert!(matches!(err, AppError::Selection { .. }));
        assert_eq!(fx.assistant.active_document(), Some("plan.pdf"));
    }

    #[tokio::test]
    async fn test_completion_failure_keeps_user_turn() {
        let mut fx = fixture_with(CountingCompleter {
            fail: true,
            ..Default::default()
        });
        fx.assistant.upload(vec![pdf("plan.pdf")]).await.unwrap();

        let err = fx
            .assistant
            .ask("What are the risks mentioned in section 3?")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Answer { .. }));
        assert_eq!(fx.completer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.assistant.history().len(), 1);
    }

    fn indexing_fixture() -> (TempDir, Assistant) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path().join("uploaded_docs"), dir.path().join("docs"));
        let retriever = Arc::new(VectorRetriever::new(
            Arc::new(HashingEmbedder::new(384)),
            ChunkingConfig::default(),
            2,
        ));
        let pipeline = AnsweringPipeline::new(
            Arc::new(CountingCompleter::default()),
            "llama3-8b-8192",
        );
        (dir, Assistant::new(store, retriever, pipeline))
    }

    #[tokio::test]
    async fn test_short_text_document_is_indexed_and_activated() {
        let (_dir, mut assistant) = indexing_fixture();

        let summary = assistant
            .upload(vec![UploadedFile::new("notes.txt", "Budget is 5M.")])
            .await
            .unwrap();

        assert_eq!(summary.chunks_indexed, 1);
        assert_eq!(assistant.active_document(), Some("notes.txt"));
        assert_eq!(assistant.documents().documents, vec!["notes.txt"]);
        assert_eq!(assistant.status().map(|s| s.chunks), Some(1));
    }

    #[tokio::test]
    async fn test_unindexable_batch_leaves_consistent_state() {
        let (_dir, mut assistant) = indexing_fixture();
        assistant
            .upload(vec![UploadedFile::new("plan.txt", "Pilot launch in Q3.")])
            .await
            .unwrap();

        let err = assistant
            .upload(vec![UploadedFile::new("scan.pdf", "not really a pdf")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ingest { ref message } if message.contains("scan.pdf")));

        // nothing stale stays queryable
        assert!(assistant.status().is_none());
        assert!(!assistant.working_dir().exists());
        assert_eq!(assistant.active_document(), Some("scan.pdf"));
        assert_eq!(assistant.documents().documents, vec!["plan.txt", "scan.pdf"]);

        let err = assistant
            .ask("What are the key milestones in the NPD plan?")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoDocuments));
        assert!(assistant.history().is_empty());

        // a good batch recovers
        assert_ok!(
            assistant
                .upload(vec![UploadedFile::new("plan.txt", "Pilot launch in Q3.")])
                .await
        );
        assert_eq!(assistant.status().map(|s| s.mode), Some(SourceMode::Uploaded));
    }

    #[tokio::test]
    async fn test_upload_writes_working_dir_and_release_removes_it() {
        let mut fx = fixture();
        let summary = fx
            .assistant
            .upload(vec![pdf("plan.pdf"), pdf("notes.txt")])
            .await
            .unwrap();

        assert_eq!(summary.message, UPLOAD_NOTICE);
        assert_eq!(summary.active_document.as_deref(), Some("plan.pdf"));
        assert_eq!(summary.files.len(), 2);
        assert!(fx.assistant.working_dir().join("notes.txt").exists());

        assert_ok!(fx.assistant.release());
        assert!(!fx.assistant.working_dir().exists());
    }
}
