//! Document store
//!
//! Owns the working directory that holds the most recent upload batch.
//! Every ingest clears the previous batch and writes the new one, so the
//! directory always mirrors exactly one upload.
//!
//! The working directory is a single shared path with no locking. Two
//! processes pointed at the same path can race the remove/recreate
//! sequence; give each process its own `storage.working_dir`.

use crate::errors::IngestionError;
use docqa_common::config::StorageConfig;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extensions accepted by the upload interface
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "docx", "txt"];

/// A file received from the upload widget
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A file as written to the working directory
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WrittenFile {
    pub name: String,
    pub size_bytes: usize,
    pub sha256: String,
}

/// Result of writing one upload batch
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub dir: PathBuf,
    /// First file of the batch, by upload order
    pub active_document: String,
    pub files: Vec<WrittenFile>,
    /// Names that appeared more than once; the last copy is on disk
    pub duplicates: Vec<String>,
}

/// Where the retrieval index should be built from
#[derive(Debug, Clone)]
pub enum SourceSelection {
    Uploaded(IngestOutcome),
    Fallback { dir: PathBuf },
}

impl SourceSelection {
    pub fn dir(&self) -> &Path {
        match self {
            SourceSelection::Uploaded(outcome) => &outcome.dir,
            SourceSelection::Fallback { dir } => dir,
        }
    }
}

/// Reduce an uploaded name to a bare file name and check its extension
pub fn validate_file_name(raw: &str) -> Result<String, IngestionError> {
    let name = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    if name.is_empty() || name == "." || name == ".." {
        return Err(IngestionError::InvalidFileName(raw.to_string()));
    }

    let allowed = Path::new(&name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false);

    if !allowed {
        return Err(IngestionError::UnsupportedFileType(name));
    }

    Ok(name)
}

/// Owns the working directory and the read-only fallback directory
#[derive(Debug, Clone)]
pub struct DocumentStore {
    working_dir: PathBuf,
    fallback_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(working_dir: impl Into<PathBuf>, fallback_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            fallback_dir: fallback_dir.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.working_dir.clone(), config.fallback_dir.clone())
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn fallback_dir(&self) -> &Path {
        &self.fallback_dir
    }

    /// Pick the retrieval source for this interaction.
    ///
    /// Non-empty `files` are ingested. Otherwise the fallback directory is used
    /// if it exists and has at least one entry. Otherwise there is nothing to
    /// query.
    pub fn prepare(&self, files: &[UploadedFile]) -> Result<SourceSelection, IngestionError> {
        if !files.is_empty() {
            return self.ingest(files).map(SourceSelection::Uploaded);
        }

        match self.fallback_source() {
            Some(dir) => {
                info!(dir = %dir.display(), "Using fallback document folder");
                Ok(SourceSelection::Fallback { dir })
            }
            None => Err(IngestionError::NothingToIngest),
        }
    }

    /// The fallback directory, if it exists and is non-empty
    pub fn fallback_source(&self) -> Option<PathBuf> {
        let mut entries = fs::read_dir(&self.fallback_dir).ok()?;
        entries
            .next()
            .is_some()
            .then(|| self.fallback_dir.clone())
    }

    /// Replace the working directory contents with `files`.
    ///
    /// Names are validated before anything on disk changes. If a write fails
    /// after the directory was recreated, the partial batch is removed.
    pub fn ingest(&self, files: &[UploadedFile]) -> Result<IngestOutcome, IngestionError> {
        if files.is_empty() {
            return Err(IngestionError::EmptyBatch);
        }

        let names = files
            .iter()
            .map(|f| validate_file_name(&f.name))
            .collect::<Result<Vec<_>, _>>()?;

        remove_stale(&self.working_dir)?;
        let guard = WorkingDirGuard::create(&self.working_dir)?;

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let mut written = Vec::with_capacity(files.len());

        for (name, file) in names.iter().zip(files) {
            if !seen.insert(name.clone()) {
                warn!(name = %name, "Duplicate name in upload batch, last copy wins");
                duplicates.push(name.clone());
                written.retain(|w: &WrittenFile| &w.name != name);
            }

            let path = guard.path().join(name);
            fs::write(&path, &file.bytes).map_err(|source| IngestionError::WriteFile {
                name: name.clone(),
                source,
            })?;

            debug!(name = %name, size = file.bytes.len(), "File written");
            written.push(WrittenFile {
                name: name.clone(),
                size_bytes: file.bytes.len(),
                sha256: hex::encode(Sha256::digest(&file.bytes)),
            });
        }

        let dir = guard.commit();

        info!(
            dir = %dir.display(),
            files = written.len(),
            active = %names[0],
            "Upload batch written"
        );

        Ok(IngestOutcome {
            dir,
            active_document: names[0].clone(),
            files: written,
            duplicates,
        })
    }

    /// Remove the working directory. Safe to call when it does not exist.
    pub fn release(&self) -> Result<(), IngestionError> {
        remove_stale(&self.working_dir)
    }
}

/// Holds a freshly created working directory until the batch is complete.
/// Dropping without [`WorkingDirGuard::commit`] removes the directory.
struct WorkingDirGuard {
    path: PathBuf,
    committed: bool,
}

impl WorkingDirGuard {
    fn create(path: &Path) -> Result<Self, IngestionError> {
        fs::create_dir_all(path).map_err(|source| IngestionError::CreateDir {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            committed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self) -> PathBuf {
        self.committed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to clean up partial upload");
        }
    }
}

/// Remove `path` recursively. Read-only entries are made writable and the
/// removal retried once; a second failure is reported.
fn remove_stale(path: &Path) -> Result<(), IngestionError> {
    remove_stale_with(path, |p, is_dir| {
        if is_dir {
            fs::remove_dir_all(p)
        } else {
            fs::remove_file(p)
        }
    })
}

fn remove_stale_with<F>(path: &Path, remove: F) -> Result<(), IngestionError>
where
    F: Fn(&Path, bool) -> std::io::Result<()>,
{
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(IngestionError::RemoveStale {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let is_dir = metadata.is_dir();

    match remove(path, is_dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            warn!(path = %path.display(), "Stale entry is read-only, forcing removal");
            make_writable(path);
            remove(path, is_dir).map_err(|source| IngestionError::RemoveStale {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(IngestionError::RemoveStale {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Best-effort: grant the owner write access to `path` and everything under it
fn make_writable(path: &Path) {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return;
    };
    if metadata.file_type().is_symlink() {
        return;
    }

    let mut permissions = metadata.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let extra = if metadata.is_dir() { 0o700 } else { 0o600 };
        permissions.set_mode(permissions.mode() | extra);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
    }
    if let Err(e) = fs::set_permissions(path, permissions) {
        debug!(path = %path.display(), error = %e, "Could not change permissions");
    }

    if metadata.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable(&entry.path());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_common::AppError;
    use tempfile::TempDir;

    fn store_in(root: &TempDir) -> DocumentStore {
        DocumentStore::new(root.path().join("uploaded_docs"), root.path().join("docs"))
    }

    #[test]
    fn test_first_file_becomes_active() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);

        let outcome = store
            .ingest(&[
                UploadedFile::new("fileA.pdf", b"%PDF-a".to_vec()),
                UploadedFile::new("fileB.txt", b"bee".to_vec()),
            ])
            .unwrap();

        assert_eq!(outcome.active_document, "fileA.pdf");
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(fs::read(store.working_dir().join("fileB.txt")).unwrap(), b"bee");
    }

    #[test]
    fn test_reingest_clears_previous_batch() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);

        store.ingest(&[UploadedFile::new("old.txt", "old")]).unwrap();
        store.ingest(&[UploadedFile::new("new.txt", "new")]).unwrap();

        assert!(!store.working_dir().join("old.txt").exists());
        assert!(store.working_dir().join("new.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_stale_entries_are_removed() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let store = store_in(&root);
        store.ingest(&[UploadedFile::new("locked.txt", "x")]).unwrap();

        let nested = store.working_dir().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("inner.txt"), "y").unwrap();
        fs::set_permissions(&nested, fs::Permissions::from_mode(0o500)).unwrap();
        fs::set_permissions(
            store.working_dir().join("locked.txt"),
            fs::Permissions::from_mode(0o400),
        )
        .unwrap();

        store.ingest(&[UploadedFile::new("fresh.txt", "z")]).unwrap();
        assert!(!nested.exists());
        assert!(store.working_dir().join("fresh.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_make_writable_grants_owner_write_recursively() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let top = root.path().join("stale");
        let nested = top.join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(top.join("a.txt"), "a").unwrap();
        fs::write(nested.join("b.txt"), "b").unwrap();

        fs::set_permissions(top.join("a.txt"), fs::Permissions::from_mode(0o400)).unwrap();
        fs::set_permissions(nested.join("b.txt"), fs::Permissions::from_mode(0o400)).unwrap();
        fs::set_permissions(&nested, fs::Permissions::from_mode(0o500)).unwrap();
        fs::set_permissions(&top, fs::Permissions::from_mode(0o500)).unwrap();

        make_writable(&top);

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&top) & 0o700, 0o700);
        assert_eq!(mode(&nested) & 0o700, 0o700);
        assert_eq!(mode(&top.join("a.txt")) & 0o600, 0o600);
        assert_eq!(mode(&nested.join("b.txt")) & 0o600, 0o600);
    }

    #[test]
    fn test_permission_denied_is_retried_once() {
        use std::cell::Cell;
        use std::io;

        let root = TempDir::new().unwrap();
        let path = root.path().join("stale.txt");
        fs::write(&path, "x").unwrap();

        let attempts = Cell::new(0);
        let result = remove_stale_with(&path, |p, is_dir| {
            assert!(!is_dir);
            attempts.set(attempts.get() + 1);
            if attempts.get() == 1 {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                fs::remove_file(p)
            }
        });

        assert!(result.is_ok());
        assert_eq!(attempts.get(), 2);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_removal_failure_is_ingest_error() {
        use std::cell::Cell;
        use std::io;

        let root = TempDir::new().unwrap();
        let path = root.path().join("stuck");
        fs::create_dir(&path).unwrap();

        let attempts = Cell::new(0);
        let err = remove_stale_with(&path, |_, is_dir| {
            assert!(is_dir);
            attempts.set(attempts.get() + 1);
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        })
        .unwrap_err();

        assert_eq!(attempts.get(), 2);
        assert!(matches!(
            err,
            IngestionError::RemoveStale { ref path, ref source }
                if path.ends_with("stuck") && source.kind() == io::ErrorKind::PermissionDenied
        ));
        let err: AppError = err.into();
        assert!(matches!(err, AppError::Ingest { .. }));
    }

    #[test]
    fn test_other_removal_failure_is_not_retried() {
        use std::cell::Cell;
        use std::io;

        let root = TempDir::new().unwrap();
        let path = root.path().join("busy.txt");
        fs::write(&path, "x").unwrap();

        let attempts = Cell::new(0);
        let err = remove_stale_with(&path, |_, _| {
            attempts.set(attempts.get() + 1);
            Err(io::Error::new(io::ErrorKind::Other, "device busy"))
        })
        .unwrap_err();

        assert_eq!(attempts.get(), 1);
        assert!(matches!(err, IngestionError::RemoveStale { .. }));
    }

    #[test]
    fn test_duplicate_names_last_write_wins() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);

        let outcome = store
            .ingest(&[
                UploadedFile::new("same.txt", "first"),
                UploadedFile::new("other.txt", "other"),
                UploadedFile::new("same.txt", "second"),
            ])
            .unwrap();

        assert_eq!(outcome.duplicates, vec!["same.txt".to_string()]);
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(
            fs::read_to_string(store.working_dir().join("same.txt")).unwrap(),
            "second"
        );
    }

    #[test]
    fn test_unsupported_extension_touches_nothing() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);
        store.ingest(&[UploadedFile::new("keep.txt", "keep")]).unwrap();

        let err = store
            .ingest(&[
                UploadedFile::new("ok.pdf", "pdf"),
                UploadedFile::new("slides.pptx", "nope"),
            ])
            .unwrap_err();

        assert!(matches!(err, IngestionError::UnsupportedFileType(ref n) if n == "slides.pptx"));
        assert!(store.working_dir().join("keep.txt").exists());
    }

    #[test]
    fn test_file_name_validation() {
        assert_eq!(validate_file_name("plan.PDF").unwrap(), "plan.PDF");
        assert_eq!(validate_file_name("../../etc/notes.txt").unwrap(), "notes.txt");
        assert_eq!(validate_file_name("C:\\Users\\me\\spec.docx").unwrap(), "spec.docx");
        assert!(matches!(
            validate_file_name("dir/"),
            Err(IngestionError::InvalidFileName(_))
        ));
        assert!(matches!(
            validate_file_name(".."),
            Err(IngestionError::InvalidFileName(_))
        ));
        assert!(matches!(
            validate_file_name("README"),
            Err(IngestionError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let root = TempDir::new().unwrap();
        assert!(matches!(
            store_in(&root).ingest(&[]),
            Err(IngestionError::EmptyBatch)
        ));
    }

    #[test]
    fn test_failed_write_removes_partial_batch() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);

        let too_long = format!("{}.txt", "n".repeat(300));
        let err = store
            .ingest(&[
                UploadedFile::new("fine.txt", "ok"),
                UploadedFile::new(too_long, "fails"),
            ])
            .unwrap_err();

        assert!(matches!(err, IngestionError::WriteFile { .. }));
        assert!(!store.working_dir().exists());
    }

    #[test]
    fn test_unusable_working_dir_is_reported() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("blocker");
        fs::write(&blocker, "a file, not a directory").unwrap();
        let store = DocumentStore::new(blocker.join("uploads"), root.path().join("docs"));

        let err = store.ingest(&[UploadedFile::new("a.txt", "a")]).unwrap_err();
        assert!(matches!(
            err,
            IngestionError::CreateDir { .. } | IngestionError::RemoveStale { .. }
        ));
        let err: AppError = err.into();
        assert!(matches!(err, AppError::Ingest { .. }));
    }

    #[test]
    fn test_prepare_without_files_or_fallback() {
        let root = TempDir::new().unwrap();
        let err = store_in(&root).prepare(&[]).unwrap_err();
        assert!(matches!(err, IngestionError::NothingToIngest));
    }

    #[test]
    fn test_prepare_with_empty_fallback_dir() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("docs")).unwrap();
        assert!(store_in(&root).prepare(&[]).is_err());
    }

    #[test]
    fn test_prepare_uses_seeded_fallback() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("docs")).unwrap();
        fs::write(root.path().join("docs").join("seed.txt"), "seed").unwrap();

        match store_in(&root).prepare(&[]).unwrap() {
            SourceSelection::Fallback { dir } => assert_eq!(dir, root.path().join("docs")),
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_prefers_upload_over_fallback() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("docs")).unwrap();
        fs::write(root.path().join("docs").join("seed.txt"), "seed").unwrap();

        let selection = store_in(&root)
            .prepare(&[UploadedFile::new("plan.pdf", "pdf")])
            .unwrap();
        assert!(matches!(selection, SourceSelection::Uploaded(_)));
        assert_eq!(selection.dir(), root.path().join("uploaded_docs"));
    }

    #[test]
    fn test_release_removes_working_dir() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);
        store.ingest(&[UploadedFile::new("a.txt", "a")]).unwrap();

        store.release().unwrap();
        assert!(!store.working_dir().exists());
        store.release().unwrap();
    }

    #[test]
    fn test_digest_is_reported() {
        let root = TempDir::new().unwrap();
        let outcome = store_in(&root)
            .ingest(&[UploadedFile::new("a.txt", "abc")])
            .unwrap();
        assert_eq!(
            outcome.files[0].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(outcome.files[0].size_bytes, 3);
    }
}
