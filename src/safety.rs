use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Directory names holding generated or vendored output that must never be
/// patched in place.
pub const GENERATED_DIRS: &[&str] = &["node_modules", ".next", ".git", "dist"];

/// Keeps patch targets inside a project root and out of generated output.
#[derive(Debug, Clone)]
pub struct RootGuard {
    /// Canonical project root
    root: PathBuf,
    /// Directory names rejected anywhere below the root
    forbidden_dirs: Vec<String>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside the project root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("path is inside generated directory '{dir}': {path}")]
    GeneratedPath { path: PathBuf, dir: String },

    #[error("failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RootGuard {
    /// Create a guard for `root`, canonicalized so symlinks cannot be used to
    /// escape it.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        Self::with_forbidden(root, GENERATED_DIRS.iter().map(|d| d.to_string()).collect())
    }

    pub fn with_forbidden(
        root: impl AsRef<Path>,
        forbidden_dirs: Vec<String>,
    ) -> Result<Self, SafetyError> {
        Ok(Self {
            root: canonicalize(root.as_ref())?,
            forbidden_dirs,
        })
    }

    /// Check that `path` is safe to patch, returning its canonical form.
    ///
    /// Relative paths are resolved against the root.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let canonical = canonicalize(&absolute)?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Re-check a previously validated path right before writing it.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let canonical = canonicalize(path)?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        let relative = canonical
            .strip_prefix(&self.root)
            .map_err(|_| SafetyError::OutsideRoot {
                path: canonical.to_path_buf(),
                root: self.root.clone(),
            })?;

        for component in relative.components() {
            if let Component::Normal(name) = component {
                let name = name.to_string_lossy();
                if let Some(dir) = self.forbidden_dirs.iter().find(|d| **d == name) {
                    return Err(SafetyError::GeneratedPath {
                        path: canonical.to_path_buf(),
                        dir: dir.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, SafetyError> {
    path.canonicalize()
        .map_err(|source| SafetyError::Canonicalize {
            path: path.to_path_buf(),
            source,
        })
}
