//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::assistant::SourceStatus;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceStatus>,
}

/// Liveness check; healthy whenever the server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: docqa_common::VERSION.to_string(),
    })
}

/// Readiness check; reports whether a document source has been indexed
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let source = state.assistant.lock().await.status();

    Json(ReadyResponse {
        status: if source.is_some() { "ready" } else { "awaiting_documents" }.to_string(),
        source,
    })
}
