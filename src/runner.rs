//! End-to-end patch execution.
//!
//! Load once, transform in memory through the whole operation chain, write
//! once. Nothing reaches disk unless every operation succeeded.

use crate::document::{DocumentError, SourceDocument};
use crate::operation::{PatchError, PatchOperation, PatchState};
use crate::safety::{RootGuard, SafetyError};
use crate::verify;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("{}: {source}{}", .path.display(), already_applied_suffix(.already_applied))]
    Patch {
        path: PathBuf,
        source: PatchError,
        /// The operation's applied form is present in the document
        already_applied: bool,
    },

    #[error("{} is targeted by more than one job in the batch", .path.display())]
    DuplicateTarget { path: PathBuf },
}

impl RunError {
    /// The batch was rejected while planning, before anything was written.
    pub fn rejected_before_write(&self) -> bool {
        matches!(self, RunError::Patch { .. } | RunError::DuplicateTarget { .. })
    }
}

fn already_applied_suffix(already_applied: &bool) -> &'static str {
    if *already_applied {
        " (the patch appears to be applied already)"
    } else {
        ""
    }
}

/// Final state of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    pub id: String,
    #[serde(flatten)]
    pub state: PatchState,
    /// Whether this operation changed the snapshot it was given
    pub changed: bool,
}

/// A fully computed, not yet written, patch of one document.
#[derive(Debug, Clone)]
#[must_use = "a PatchPlan does nothing until committed"]
pub struct PatchPlan {
    document: SourceDocument,
    patched: String,
    outcomes: Vec<PatchOutcome>,
}

impl PatchPlan {
    pub fn path(&self) -> &Path {
        self.document.path()
    }

    pub fn original(&self) -> &str {
        self.document.text()
    }

    pub fn patched(&self) -> &str {
        &self.patched
    }

    pub fn is_noop(&self) -> bool {
        self.patched == self.document.text()
    }
}

/// What a run did to one document.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub path: PathBuf,
    pub outcomes: Vec<PatchOutcome>,
    #[serde(skip)]
    pub original: String,
    #[serde(skip)]
    pub patched: String,
    /// Whether the document was written
    pub written: bool,
}

impl RunReport {
    pub fn changed(&self) -> bool {
        self.original != self.patched
    }
}

/// Orchestrates load, locate, mutate, and persist for one or more documents.
#[derive(Debug, Clone, Default)]
pub struct PatchRunner {
    guard: Option<RootGuard>,
    dry_run: bool,
}

impl PatchRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict targets to the guard's root.
    pub fn with_guard(mut self, guard: RootGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Compute everything but never write.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Load `path` and run `operations` over it in memory.
    pub fn plan(
        &self,
        path: impl AsRef<Path>,
        operations: &[PatchOperation],
    ) -> Result<PatchPlan, RunError> {
        let path = match &self.guard {
            Some(guard) => guard.validate_path(path.as_ref())?,
            None => path.as_ref().to_path_buf(),
        };
        let document = SourceDocument::load(&path)?;

        let mut snapshot = document.text().to_string();
        let mut outcomes = Vec::with_capacity(operations.len());
        for op in operations {
            match op.apply(&snapshot) {
                Ok(next) => {
                    outcomes.push(PatchOutcome {
                        id: op.id.clone(),
                        state: PatchState::Pending,
                        changed: next != snapshot,
                    });
                    snapshot = next;
                }
                Err(source) => {
                    let already_applied = source.anchor_error().is_some_and(|e| e.is_not_found())
                        && verify::is_applied(&snapshot, op);
                    error!(patch = %op.id, path = %path.display(), %source, "patch rejected");
                    return Err(RunError::Patch {
                        path,
                        source,
                        already_applied,
                    });
                }
            }
        }

        Ok(PatchPlan {
            document,
            patched: snapshot,
            outcomes,
        })
    }

    /// Write a plan to disk (unless dry-running) and mark its operations
    /// applied.
    pub fn commit(&self, plan: PatchPlan) -> Result<RunReport, RunError> {
        let PatchPlan {
            document,
            patched,
            mut outcomes,
        } = plan;

        let must_write = !self.dry_run && patched != document.text();
        if must_write {
            if let Some(guard) = &self.guard {
                guard.revalidate(document.path())?;
            }
            document.persist(&patched)?;
        }

        for outcome in &mut outcomes {
            outcome.state = PatchState::Applied;
            info!(
                patch = %outcome.id,
                path = %document.path().display(),
                changed = outcome.changed,
                dry_run = self.dry_run,
                "patch applied"
            );
        }

        Ok(RunReport {
            path: document.path().to_path_buf(),
            outcomes,
            original: document.text().to_string(),
            patched,
            written: must_write,
        })
    }

    /// Plan and commit one document.
    pub fn run(
        &self,
        path: impl AsRef<Path>,
        operations: &[PatchOperation],
    ) -> Result<RunReport, RunError> {
        let plan = self.plan(path, operations)?;
        self.commit(plan)
    }

    /// Plan every document first; write only if all plans succeeded.
    pub fn run_batch<P: AsRef<Path>>(
        &self,
        jobs: &[(P, Vec<PatchOperation>)],
    ) -> Result<Vec<RunReport>, RunError> {
        let plans = jobs
            .iter()
            .map(|(path, ops)| self.plan(path, ops))
            .collect::<Result<Vec<_>, _>>()?;
        self.commit_batch(plans)
    }

    /// Commit a set of plans as a unit.
    ///
    /// Every plan must target a distinct file, and every target must still
    /// match the text it was planned from, before the first write happens.
    pub fn commit_batch(&self, plans: Vec<PatchPlan>) -> Result<Vec<RunReport>, RunError> {
        let mut seen = HashSet::new();
        for plan in &plans {
            let key = fs::canonicalize(plan.path()).unwrap_or_else(|_| plan.path().to_path_buf());
            if !seen.insert(key) {
                error!(path = %plan.path().display(), "file planned twice in one batch");
                return Err(RunError::DuplicateTarget {
                    path: plan.path().to_path_buf(),
                });
            }
        }

        if !self.dry_run {
            for plan in plans.iter().filter(|plan| !plan.is_noop()) {
                plan.document.verify_unchanged()?;
            }
        }

        plans.into_iter().map(|plan| self.commit(plan)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{Anchor, AnchorError};
    use std::fs;

    fn label_op() -> PatchOperation {
        PatchOperation::replace_substring("label", Anchor::literal("'Calling.'"), "'Calling…'")
    }

    fn write_doc(dir: &Path) -> PathBuf {
        let path = dir.join("Main.tsx");
        fs::write(
            &path,
            "    const label = callState === 'calling' ? 'Calling.' : 'In call';\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_run_writes_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_doc(temp_dir.path());

        let report = PatchRunner::new().run(&path, &[label_op()]).unwrap();
        assert!(report.written);
        assert_eq!(report.outcomes[0].state, PatchState::Applied);
        assert!(fs::read_to_string(&path).unwrap().contains("'Calling…'"));
    }

    #[test]
    fn test_second_run_fails_and_reports_applied() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_doc(temp_dir.path());
        let runner = PatchRunner::new();

        runner.run(&path, &[label_op()]).unwrap();
        let err = runner.run(&path, &[label_op()]).unwrap_err();
        match err {
            RunError::Patch {
                source,
                already_applied,
                ..
            } => {
                assert!(already_applied);
                assert!(matches!(
                    source.anchor_error(),
                    Some(AnchorError::AnchorNotFound { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_failure_leaves_file_untouched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_doc(temp_dir.path());
        let before = fs::read_to_string(&path).unwrap();

        let ops = vec![
            label_op(),
            PatchOperation::replace_substring("missing", Anchor::literal("nope"), "x"),
        ];
        assert!(PatchRunner::new().run(&path, &ops).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_dry_run_does_not_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_doc(temp_dir.path());
        let before = fs::read_to_string(&path).unwrap();

        let report = PatchRunner::new().dry_run(true).run(&path, &[label_op()]).unwrap();
        assert!(!report.written);
        assert!(report.changed());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let good = write_doc(temp_dir.path());
        let bad = temp_dir.path().join("Other.tsx");
        fs::write(&bad, "nothing to see\n").unwrap();
        let before = fs::read_to_string(&good).unwrap();

        let jobs = vec![(good.clone(), vec![label_op()]), (bad, vec![label_op()])];
        assert!(PatchRunner::new().run_batch(&jobs).is_err());
        assert_eq!(fs::read_to_string(&good).unwrap(), before);
    }

    #[test]
    fn test_batch_rejects_same_file_twice() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_doc(temp_dir.path());
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        let alias = temp_dir.path().join("sub/../Main.tsx");
        let before = fs::read_to_string(&path).unwrap();

        let other = PatchOperation::replace_substring("other", Anchor::literal("'In call'"), "'Live'");
        let jobs = vec![(path.clone(), vec![label_op()]), (alias, vec![other])];
        let err = PatchRunner::new().run_batch(&jobs).unwrap_err();
        assert!(matches!(err, RunError::DuplicateTarget { .. }));
        assert!(err.rejected_before_write());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_commit_batch_checks_every_target_first() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = write_doc(temp_dir.path());
        let second = temp_dir.path().join("Other.tsx");
        fs::write(&second, "const label = 'Calling.';\n").unwrap();
        let before = fs::read_to_string(&first).unwrap();

        let runner = PatchRunner::new();
        let plans = vec![
            runner.plan(&first, &[label_op()]).unwrap(),
            runner.plan(&second, &[label_op()]).unwrap(),
        ];
        fs::write(&second, "const label = 'Edited elsewhere';\n").unwrap();

        let err = runner.commit_batch(plans).unwrap_err();
        assert!(matches!(err, RunError::Document(DocumentError::Changed { .. })));
        assert_eq!(fs::read_to_string(&first).unwrap(), before);
        assert_eq!(
            fs::read_to_string(&second).unwrap(),
            "const label = 'Edited elsewhere';\n"
        );
    }

    #[test]
    fn test_guard_rejects_outside_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("project");
        fs::create_dir_all(&root).unwrap();
        let outside = write_doc(temp_dir.path());

        let runner = PatchRunner::new().with_guard(RootGuard::new(&root).unwrap());
        let err = runner.run(&outside, &[label_op()]).unwrap_err();
        assert!(matches!(err, RunError::Safety(SafetyError::OutsideRoot { .. })));
    }
}
