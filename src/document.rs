use crate::mutate::Lines;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// A document loaded for one patch invocation.
///
/// The text is never mutated in place; patch steps produce new snapshots and
/// only the final one is handed to [`SourceDocument::persist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    path: PathBuf,
    text: String,
    fingerprint: u64,
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} changed on disk since it was loaded; refusing to overwrite")]
    Changed { path: PathBuf },
}

impl SourceDocument {
    /// Read the whole file into memory.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();
        let text = fs::read_to_string(&path).map_err(|source| DocumentError::Read {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), bytes = text.len(), "loaded document");
        Ok(Self::from_text(path, text))
    }

    /// Build a document from text already in memory.
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            path: path.into(),
            fingerprint: xxh3_64(text.as_bytes()),
            text,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The document split into lines. Derived on each call.
    pub fn lines(&self) -> Lines {
        Lines::parse(&self.text)
    }

    /// xxh3 hash of the text as loaded.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Re-read the file and compare it with the text as loaded.
    pub fn verify_unchanged(&self) -> Result<(), DocumentError> {
        let current = fs::read(&self.path).map_err(|source| DocumentError::Read {
            path: self.path.clone(),
            source,
        })?;
        if xxh3_64(&current) != self.fingerprint {
            return Err(DocumentError::Changed {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Replace the on-disk file with `new_text` in a single atomic write.
    ///
    /// Fails with [`DocumentError::Changed`] if the file no longer matches
    /// what was loaded, leaving it untouched.
    pub fn persist(&self, new_text: &str) -> Result<(), DocumentError> {
        self.verify_unchanged()?;

        atomic_write(&self.path, new_text.as_bytes()).map_err(|source| DocumentError::Write {
            path: self.path.clone(),
            source,
        })?;

        // Bump mtime so file watchers (dev servers) pick the change up.
        filetime::set_file_mtime(&self.path, filetime::FileTime::now()).map_err(|source| {
            DocumentError::Write {
                path: self.path.clone(),
                source,
            }
        })?;

        info!(path = %self.path.display(), bytes = new_text.len(), "document written");
        Ok(())
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full content lands or the original file is left as it was.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no parent directory",
            ))
        }
    };

    // Same directory so the rename stays on one filesystem.
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the original permissions; NamedTempFile creates files as 0600.
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp.path(), meta.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
