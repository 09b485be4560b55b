//! Declarative patch config schema.

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
    /// Directory of the file this config was loaded from; `block_file` paths
    /// resolve against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl PatchConfig {
    /// Check every patch, collecting all issues rather than stopping at the
    /// first.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        let mut seen = HashSet::new();
        for patch in &self.patches {
            if !patch.id.trim().is_empty() && !seen.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message: "duplicate patch id".to_string(),
                });
            }
            patch.collect_issues(&mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

impl PatchDefinition {
    fn collect_issues(&self, issues: &mut Vec<ValidationIssue>) {
        let id = (!self.id.trim().is_empty()).then(|| self.id.clone());
        let missing = |field: &'static str| ValidationIssue::MissingField {
            patch_id: id.clone(),
            field,
        };
        let invalid = |message: &str| ValidationIssue::InvalidCombo {
            patch_id: id.clone(),
            message: message.to_string(),
        };

        if id.is_none() {
            issues.push(missing("id"));
        }
        if self.file.trim().is_empty() {
            issues.push(missing("file"));
        }

        match &self.anchor {
            AnchorSpec::Literal { text, .. } if text.is_empty() => {
                issues.push(missing("anchor.text"))
            }
            AnchorSpec::Line {
                equals,
                trimmed,
                contains,
                ..
            } => {
                let given: Vec<&str> = [equals, trimmed, contains]
                    .into_iter()
                    .flatten()
                    .map(String::as_str)
                    .collect();
                if given.len() != 1 {
                    issues.push(invalid(
                        "line anchor needs exactly one of equals, trimmed, contains",
                    ));
                }
                if given.iter().any(|needle| needle.trim().is_empty()) {
                    issues.push(missing("anchor.line"));
                }
            }
            AnchorSpec::TokenSpan { start, end, .. } => {
                if start.is_empty() {
                    issues.push(missing("anchor.start"));
                }
                if end.is_empty() {
                    issues.push(missing("anchor.end"));
                }
            }
            AnchorSpec::Literal { .. } => {}
        }

        let (anchor_ok, requirement) = match &self.operation {
            OperationSpec::Replace { .. } => (
                matches!(self.anchor, AnchorSpec::Literal { .. }),
                "replace requires a literal anchor",
            ),
            OperationSpec::ReplaceLine { lines } | OperationSpec::InsertAfterLine { lines } => {
                if lines.is_empty() {
                    issues.push(missing("operation.lines"));
                }
                (
                    matches!(self.anchor, AnchorSpec::Line { .. }),
                    "line operations require a line anchor",
                )
            }
            OperationSpec::ReplaceSpan { block, block_file } => {
                if block.is_some() == block_file.is_some() {
                    issues.push(invalid("replace-span needs exactly one of block, block_file"));
                }
                (
                    matches!(self.anchor, AnchorSpec::TokenSpan { .. }),
                    "replace-span requires a token-span anchor",
                )
            }
        };
        if !anchor_ok {
            issues.push(invalid(requirement));
        }

        if self.verify.as_ref().is_some_and(|v| v.applied.is_empty()) {
            issues.push(missing("verify.applied"));
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Resolve each patch `file` against the project root
    #[serde(default)]
    pub root_relative: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    pub anchor: AnchorSpec,
    pub operation: OperationSpec,
    #[serde(default)]
    pub verify: Option<Verify>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceSpec {
    First,
    Unique,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AnchorSpec {
    Literal {
        text: String,
        #[serde(default)]
        occurrence: Option<OccurrenceSpec>,
        /// Recorded byte offset; re-derived by content search if stale
        #[serde(default)]
        at: Option<usize>,
    },
    Line {
        #[serde(default)]
        equals: Option<String>,
        #[serde(default)]
        trimmed: Option<String>,
        #[serde(default)]
        contains: Option<String>,
        #[serde(default)]
        occurrence: Option<OccurrenceSpec>,
        /// Recorded 0-based line index; re-derived by content search if stale
        #[serde(default)]
        at: Option<usize>,
    },
    TokenSpan {
        start: String,
        end: String,
        #[serde(default)]
        occurrence: Option<OccurrenceSpec>,
        #[serde(default)]
        at: Option<usize>,
    },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OperationSpec {
    Replace {
        text: String,
    },
    ReplaceLine {
        lines: Vec<String>,
    },
    InsertAfterLine {
        lines: Vec<String>,
    },
    ReplaceSpan {
        #[serde(default)]
        block: Option<String>,
        #[serde(default)]
        block_file: Option<String>,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Verify {
    /// Literal fragment present once the patch is applied
    pub applied: String,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch config contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
