//! Question handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::assistant::AskOutcome;
use crate::AppState;
use docqa_common::errors::{AppError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 4000))]
    pub question: String,
}

/// Ask a question about the indexed documents
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskOutcome>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    let outcome = state.assistant.lock().await.ask(&request.question).await?;
    Ok(Json(outcome))
}
