//! Patch applicator: turns patch definitions into operations and runs them.
//!
//! All patches in a config are planned in memory first, grouped by target
//! file in config order. Files are written only when every patch in the
//! config resolved.

use crate::anchor::{Anchor, LineMatch, Occurrence};
use crate::config::loader::ConfigError;
use crate::config::schema::{
    AnchorSpec, OccurrenceSpec, OperationSpec, PatchConfig, PatchDefinition,
};
use crate::document::SourceDocument;
use crate::mutate::Payload;
use crate::operation::PatchOperation;
use crate::runner::{PatchRunner, RunError, RunReport};
use crate::safety::{RootGuard, SafetyError};
use crate::verify::{self, ProbeStatus};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    /// Config could not be turned into operations
    Config(ConfigError),
    /// Target path failed the root guard
    Safety(SafetyError),
    /// A patch was rejected or the write failed
    Run(RunError),
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Config(e) => write!(f, "config error: {}", e),
            ApplicationError::Safety(e) => write!(f, "unsafe target: {}", e),
            ApplicationError::Run(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Config(e) => Some(e),
            ApplicationError::Safety(e) => Some(e),
            ApplicationError::Run(e) => Some(e),
        }
    }
}

impl From<ConfigError> for ApplicationError {
    fn from(e: ConfigError) -> Self {
        ApplicationError::Config(e)
    }
}

impl From<SafetyError> for ApplicationError {
    fn from(e: SafetyError) -> Self {
        ApplicationError::Safety(e)
    }
}

impl From<RunError> for ApplicationError {
    fn from(e: RunError) -> Self {
        ApplicationError::Run(e)
    }
}

/// Status of one patch definition, as reported by [`check_patches`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchStatus {
    pub id: String,
    pub file: PathBuf,
    #[serde(flatten)]
    pub status: ProbeStatus,
}

/// Apply every patch in `config`.
///
/// # Arguments
///
/// * `config` - The patch configuration to apply
/// * `root` - Project root; relative targets resolve against it when
///   `meta.root_relative` is set, and every target must live under it
/// * `dry_run` - Compute and report without writing
pub fn apply_patches(
    config: &PatchConfig,
    root: &Path,
    dry_run: bool,
) -> Result<Vec<RunReport>, ApplicationError> {
    let jobs = build_jobs(config, root)?;
    let runner = PatchRunner::new()
        .with_guard(RootGuard::new(root)?)
        .dry_run(dry_run);
    Ok(runner.run_batch(&jobs)?)
}

/// Probe every patch in `config` without writing anything.
///
/// Each patch is probed against the document as left by the patches before it
/// in the same file, so chained patches report consistently.
pub fn check_patches(
    config: &PatchConfig,
    root: &Path,
) -> Result<Vec<PatchStatus>, ApplicationError> {
    let jobs = build_jobs(config, root)?;
    let guard = RootGuard::new(root)?;

    let mut statuses = Vec::new();
    for (file, ops) in jobs {
        let target = match guard.validate_path(&file) {
            Ok(target) => target,
            Err(err) => {
                for op in &ops {
                    statuses.push(PatchStatus {
                        id: op.id.clone(),
                        file: file.clone(),
                        status: ProbeStatus::Drifted {
                            reason: err.to_string(),
                        },
                    });
                }
                continue;
            }
        };
        let document = SourceDocument::load(&target).map_err(RunError::from)?;

        let mut snapshot = document.text().to_string();
        for op in &ops {
            let status = verify::probe(&snapshot, op);
            if status == ProbeStatus::Pending {
                if let Ok(next) = op.apply(&snapshot) {
                    snapshot = next;
                }
            }
            statuses.push(PatchStatus {
                id: op.id.clone(),
                file: file.clone(),
                status,
            });
        }
    }
    Ok(statuses)
}

/// Group operations by resolved target file, keeping config order.
///
/// Targets that exist are grouped by their canonical path, so two spellings
/// of one file share a single job. Missing targets keep their resolved path
/// and fail later in the root guard or on load.
pub fn build_jobs(
    config: &PatchConfig,
    root: &Path,
) -> Result<Vec<(PathBuf, Vec<PatchOperation>)>, ConfigError> {
    let mut jobs: Vec<(PathBuf, Vec<PatchOperation>)> = Vec::new();
    for patch in &config.patches {
        let file = if config.meta.root_relative {
            root.join(&patch.file)
        } else {
            PathBuf::from(&patch.file)
        };
        let file = fs::canonicalize(&file).unwrap_or(file);
        let op = build_operation(patch, config.base_dir.as_deref())?;
        match jobs.iter_mut().find(|(path, _)| *path == file) {
            Some((_, ops)) => ops.push(op),
            None => jobs.push((file, vec![op])),
        }
    }
    Ok(jobs)
}

/// Turn one definition into an operation. `base_dir` resolves `block_file`.
pub fn build_operation(
    patch: &PatchDefinition,
    base_dir: Option<&Path>,
) -> Result<PatchOperation, ConfigError> {
    let anchor = build_anchor(&patch.anchor);
    let op = match &patch.operation {
        OperationSpec::Replace { text } => {
            PatchOperation::replace_substring(&patch.id, anchor, text.as_str())
        }
        OperationSpec::ReplaceLine { lines } => {
            PatchOperation::replace_line(&patch.id, anchor, Payload::lines(lines.clone()))
        }
        OperationSpec::InsertAfterLine { lines } => {
            PatchOperation::insert_after_line(&patch.id, anchor, Payload::lines(lines.clone()))
        }
        OperationSpec::ReplaceSpan { block, block_file } => {
            let block = match (block, block_file) {
                (Some(block), _) => block.clone(),
                (None, Some(file)) => {
                    let path = match base_dir {
                        Some(dir) => dir.join(file),
                        None => PathBuf::from(file),
                    };
                    fs::read_to_string(&path).map_err(|source| ConfigError::BlockFile {
                        patch_id: patch.id.clone(),
                        path,
                        source,
                    })?
                }
                (None, None) => String::new(),
            };
            PatchOperation::replace_span(&patch.id, anchor, block)
        }
    };

    Ok(match &patch.verify {
        Some(verify) => op.with_applied_marker(Anchor::literal(verify.applied.clone())),
        None => op,
    })
}

fn build_anchor(spec: &AnchorSpec) -> Anchor {
    match spec {
        AnchorSpec::Literal {
            text,
            occurrence,
            at,
        } => Anchor::literal(text.clone()).with_occurrence(occurrence_of(
            *occurrence,
            *at,
            Occurrence::Unique,
        )),
        AnchorSpec::Line {
            equals,
            trimmed,
            contains,
            occurrence,
            at,
        } => {
            let matcher = match (equals, trimmed, contains) {
                (Some(text), _, _) => LineMatch::Equals(text.clone()),
                (None, Some(text), _) => LineMatch::Trimmed(text.clone()),
                (None, None, Some(text)) => LineMatch::Contains(text.clone()),
                (None, None, None) => LineMatch::Contains(String::new()),
            };
            Anchor::line(matcher).with_occurrence(occurrence_of(*occurrence, *at, Occurrence::Unique))
        }
        AnchorSpec::TokenSpan {
            start,
            end,
            occurrence,
            at,
        } => Anchor::token_span(start.clone(), end.clone()).with_occurrence(occurrence_of(
            *occurrence,
            *at,
            Occurrence::First,
        )),
    }
}

// A recorded position takes precedence; the locator falls back to unique
// content search when it is stale.
fn occurrence_of(spec: Option<OccurrenceSpec>, at: Option<usize>, default: Occurrence) -> Occurrence {
    match (at, spec) {
        (Some(index), _) => Occurrence::At(index),
        (None, Some(OccurrenceSpec::First)) => Occurrence::First,
        (None, Some(OccurrenceSpec::Unique)) => Occurrence::Unique,
        (None, None) => default,
    }
}
