//! Document upload and selection handlers

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};

use crate::assistant::{DocumentList, UploadSummary};
use crate::AppState;
use docqa_common::errors::{AppError, Result};
use docqa_ingestion::UploadedFile;

/// Multipart field carrying uploaded files
pub const UPLOAD_FIELD: &str = "files";

fn multipart_error(e: MultipartError) -> AppError {
    AppError::Validation {
        message: format!("malformed upload: {}", e),
        field: Some(UPLOAD_FIELD.to_string()),
    }
}

/// Replace the working directory with the uploaded files and reindex.
///
/// A request with no files falls back to the pre-seeded folder.
pub async fn upload_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadSummary>)> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation {
                message: "file part is missing a file name".to_string(),
                field: Some(UPLOAD_FIELD.to_string()),
            })?;
        let bytes = field.bytes().await.map_err(multipart_error)?;

        files.push(UploadedFile::new(name, bytes.to_vec()));
    }

    tracing::debug!(files = files.len(), "Upload received");

    let summary = state.assistant.lock().await.upload(files).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Sidebar listing of known documents
pub async fn list_documents(State(state): State<AppState>) -> Json<DocumentList> {
    Json(state.assistant.lock().await.documents())
}

/// Make a previously uploaded document active
pub async fn select_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DocumentList>> {
    let mut assistant = state.assistant.lock().await;
    assistant.select(&name)?;
    Ok(Json(assistant.documents()))
}
