//! Directory reader
//!
//! Loads the text of every readable file in one directory (not recursive).
//! PDF and DOCX files go through their extractors; anything else is read
//! as UTF-8 with lossy replacement.

use crate::docx::extract_text_from_docx;
use crate::errors::IngestionError;
use crate::pdf::extract_text_from_pdf;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Text loaded from one file
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// File name, used as the source label
    pub name: String,
    pub path: PathBuf,
    pub text: String,
}

/// Extract text from a single file based on its extension
pub fn extract_text(path: &Path) -> Result<String, IngestionError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("pdf") => extract_text_from_pdf(path),
        Some("docx") => extract_text_from_docx(path),
        _ => {
            let bytes = fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

/// Load every non-hidden file directly inside `dir`, sorted by name.
///
/// Files that fail to parse or hold no text are skipped with a warning.
pub fn load_directory(dir: &Path) -> Result<Vec<LoadedDocument>, IngestionError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| !n.starts_with('.'))
        })
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match extract_text(&path) {
            Ok(text) if text.trim().is_empty() => {
                warn!(file = %name, "No text in file, skipping");
            }
            Ok(text) => {
                debug!(file = %name, chars = text.len(), "File loaded");
                documents.push(LoadedDocument { name, path, text });
            }
            Err(e) => {
                warn!(file = %name, error = %e, "Failed to read file, skipping");
            }
        }
    }

    info!(dir = %dir.display(), documents = documents.len(), "Directory loaded");
    Ok(documents)
}
