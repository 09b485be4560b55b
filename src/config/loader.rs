//! Loading patch configs from TOML.

use crate::config::schema::{PatchConfig, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: malformed TOML: {source}", origin(.path))]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("{}: {source}", origin(.path))]
    Validation {
        path: Option<PathBuf>,
        #[source]
        source: ValidationError,
    },

    #[error("patch '{patch_id}': cannot read block_file {}: {source}", .path.display())]
    BlockFile {
        patch_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn origin(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "<inline config>".to_string(),
    }
}

/// Collect the `*.toml` patch files directly inside `dir`, sorted by name.
pub fn discover_patch_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry.map_err(|err| ConfigError::Io {
            path: dir.to_path_buf(),
            source: err.into(),
        })?;
        let is_toml = entry.path().extension().is_some_and(|ext| ext == "toml");
        if entry.file_type().is_file() && is_toml {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Parse and validate a config held in memory.
pub fn load_from_str(input: &str) -> Result<PatchConfig, ConfigError> {
    parse(input, None)
}

/// Parse and validate a config file. `block_file` paths in it resolve against
/// the file's directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchConfig, ConfigError> {
    let path = path.as_ref();
    let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse(&input, Some(path))?;
    config.base_dir = path.parent().map(Path::to_path_buf);
    Ok(config)
}

fn parse(input: &str, path: Option<&Path>) -> Result<PatchConfig, ConfigError> {
    let config: PatchConfig =
        toml_edit::de::from_str(input).map_err(|source| ConfigError::Parse {
            path: path.map(Path::to_path_buf),
            source,
        })?;
    if let Err(source) = config.validate() {
        return Err(ConfigError::Validation {
            path: path.map(Path::to_path_buf),
            source,
        });
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[[patches]]
id = "call-label"
file = "src/app/Main.tsx"

[patches.anchor]
type = "literal"
text = "'Calling.'"

[patches.operation]
type = "replace"
text = "'Calling…'"
"#;

    #[test]
    fn test_load_from_str_minimal() {
        let config = load_from_str(MINIMAL).unwrap();
        assert_eq!(config.patches.len(), 1);
        assert!(!config.meta.root_relative);
        assert!(config.base_dir.is_none());
    }

    #[test]
    fn test_load_from_path_sets_base_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("label.toml");
        fs::write(&path, MINIMAL).unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.base_dir.as_deref(), Some(temp_dir.path()));
    }

    #[test]
    fn test_parse_error_mentions_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[[patches]\nid = ").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: Some(_), .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_discover_patch_files_sorted_toml_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("b.toml"), MINIMAL).unwrap();
        fs::write(temp_dir.path().join("a.toml"), MINIMAL).unwrap();
        fs::write(temp_dir.path().join("notes.md"), "ignored").unwrap();
        fs::create_dir(temp_dir.path().join("archived")).unwrap();
        fs::write(temp_dir.path().join("archived/c.toml"), MINIMAL).unwrap();

        let files = discover_patch_files(temp_dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.toml", "b.toml"]);
    }

    #[test]
    fn test_validation_error_surfaces() {
        let err = load_from_str("[meta]\nname = \"empty\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
        assert!(err.to_string().contains("no patches"));
    }
}
