//! Dry-run presence checks.
//!
//! Probes never fail and never mutate anything. They answer "would this patch
//! apply?" so a re-run can report that there is nothing to do instead of
//! touching an already-patched document.

use crate::anchor::{Anchor, LineMatch, Occurrence};
use crate::mutate::{AnchorContext, Payload};
use crate::operation::{MutationKind, PatchOperation};
use serde::Serialize;
use std::fmt;

/// Whether `anchor` occurs anywhere in `text`.
///
/// Uniqueness and fixed positions are not enforced: presence is all that is
/// asked.
pub fn check_presence(text: &str, anchor: &Anchor) -> bool {
    anchor
        .clone()
        .with_occurrence(Occurrence::First)
        .locate(text)
        .is_ok()
}

/// Status of one operation against a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ProbeStatus {
    /// The anchor resolves and applying would change the document
    Pending,
    /// The patch is already in place
    Applied,
    /// Neither the anchor nor the applied form was found
    Drifted { reason: String },
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Pending => f.write_str("pending"),
            ProbeStatus::Applied => f.write_str("applied"),
            ProbeStatus::Drifted { reason } => write!(f, "drifted: {reason}"),
        }
    }
}

/// Classify `operation` against `text` without changing anything.
pub fn probe(text: &str, operation: &PatchOperation) -> ProbeStatus {
    // An insertion leaves its anchor in place, so only the marker tells.
    if operation.kind == MutationKind::InsertAfterLine && is_applied(text, operation) {
        return ProbeStatus::Applied;
    }
    match operation.apply(text) {
        Ok(next) if next == text => ProbeStatus::Applied,
        Ok(_) => ProbeStatus::Pending,
        Err(err) => {
            let anchor_absent = err.anchor_error().is_some_and(|e| e.is_not_found());
            if anchor_absent && is_applied(text, operation) {
                ProbeStatus::Applied
            } else {
                ProbeStatus::Drifted {
                    reason: err.to_string(),
                }
            }
        }
    }
}

/// Whether the applied form of `operation` is present in `text`.
///
/// Uses the explicit applied-marker when one is set, otherwise derives one
/// from a literal payload.
pub fn is_applied(text: &str, operation: &PatchOperation) -> bool {
    match operation
        .applied_marker
        .clone()
        .or_else(|| derived_marker(operation))
    {
        Some(marker) => check_presence(text, &marker),
        None => false,
    }
}

fn derived_marker(operation: &PatchOperation) -> Option<Anchor> {
    if matches!(operation.payload, Payload::Computed(_)) {
        return None;
    }
    let rendered = operation.payload.render(&AnchorContext::default());
    let first = rendered.lines().map(str::trim).find(|l| !l.is_empty())?;
    match operation.kind {
        MutationKind::ReplaceSubstring if !rendered.trim().is_empty() => {
            Some(Anchor::literal(rendered))
        }
        _ => Some(Anchor::line(LineMatch::Trimmed(first.to_string()))),
    }
}
