//! Chat history handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;
use docqa_common::session::ChatTurn;

#[derive(Serialize)]
pub struct HistoryResponse {
    /// Active document, absent in fallback mode
    pub document: Option<String>,
    /// Newest first
    pub turns: Vec<ChatTurn>,
}

pub async fn history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let assistant = state.assistant.lock().await;

    Json(HistoryResponse {
        document: assistant.active_document().map(str::to_string),
        turns: assistant.history(),
    })
}
