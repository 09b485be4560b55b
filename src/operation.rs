//! Patch operations: one anchor, one mutation, one payload.
//!
//! Every operation is a pure transform from a document snapshot to a new
//! snapshot. Operations never write; persisting is the runner's job.

use crate::anchor::{locate_line, locate_substring, Anchor, AnchorError, Location, Span};
use crate::mutate::{
    insert_line_after, leading_indent, replace_line_at, replace_span, AnchorContext, Lines,
    Payload,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// How the located fragment is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    /// Replace a literal match with the payload
    ReplaceSubstring,
    /// Replace the matched line with the payload lines, keeping its indentation
    ReplaceLine,
    /// Insert the payload lines after the matched line, keeping its indentation
    InsertAfterLine,
    /// Replace a token-delimited block with the payload, verbatim
    ReplaceSpan,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::ReplaceSubstring => "replace",
            MutationKind::ReplaceLine => "replace-line",
            MutationKind::InsertAfterLine => "insert-after-line",
            MutationKind::ReplaceSpan => "replace-span",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("patch '{id}': {source}")]
    Anchor { id: String, source: AnchorError },

    #[error("patch '{id}': {kind} cannot be used with a {anchor} anchor")]
    KindMismatch {
        id: String,
        kind: MutationKind,
        anchor: &'static str,
    },

    #[error("patch '{id}': payload rendered no lines")]
    EmptyPayload { id: String },
}

impl PatchError {
    pub fn id(&self) -> &str {
        match self {
            PatchError::Anchor { id, .. }
            | PatchError::KindMismatch { id, .. }
            | PatchError::EmptyPayload { id } => id,
        }
    }

    pub fn anchor_error(&self) -> Option<&AnchorError> {
        match self {
            PatchError::Anchor { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Lifecycle of one operation within an invocation.
///
/// `Rejected` is terminal: anchors describe one document revision and are
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum PatchState {
    Pending,
    Applied,
    Rejected { reason: String },
}

/// A single anchored rewrite.
#[derive(Debug, Clone)]
#[must_use = "PatchOperation does nothing until applied"]
pub struct PatchOperation {
    pub id: String,
    pub anchor: Anchor,
    pub kind: MutationKind,
    pub payload: Payload,
    /// Fragment whose presence shows the patch is already in place. Used only
    /// for status probes and error reporting.
    pub applied_marker: Option<Anchor>,
}

impl PatchOperation {
    pub fn new(id: impl Into<String>, anchor: Anchor, kind: MutationKind, payload: Payload) -> Self {
        Self {
            id: id.into(),
            anchor,
            kind,
            payload,
            applied_marker: None,
        }
    }

    pub fn replace_substring(
        id: impl Into<String>,
        anchor: Anchor,
        payload: impl Into<Payload>,
    ) -> Self {
        Self::new(id, anchor, MutationKind::ReplaceSubstring, payload.into())
    }

    pub fn replace_line(id: impl Into<String>, anchor: Anchor, payload: Payload) -> Self {
        Self::new(id, anchor, MutationKind::ReplaceLine, payload)
    }

    pub fn insert_after_line(id: impl Into<String>, anchor: Anchor, payload: Payload) -> Self {
        Self::new(id, anchor, MutationKind::InsertAfterLine, payload)
    }

    pub fn replace_span(id: impl Into<String>, anchor: Anchor, payload: impl Into<Payload>) -> Self {
        Self::new(id, anchor, MutationKind::ReplaceSpan, payload.into())
    }

    pub fn with_applied_marker(mut self, marker: Anchor) -> Self {
        self.applied_marker = Some(marker);
        self
    }

    /// Apply this operation to a document snapshot, producing a new one.
    pub fn apply(&self, text: &str) -> Result<String, PatchError> {
        let result = match (&self.kind, &self.anchor) {
            (
                MutationKind::ReplaceSubstring,
                Anchor::Literal {
                    text: literal,
                    occurrence,
                },
            ) => {
                let offset = locate_substring(text, literal, *occurrence).map_err(|e| self.fail(e))?;
                let ctx = AnchorContext::at_offset(text, offset, literal);
                let replacement = self.payload.render(&ctx);
                replace_span(text, Span::new(offset, offset + literal.len()), &replacement)
                    .map_err(|e| self.fail(e))?
            }
            (
                MutationKind::ReplaceLine | MutationKind::InsertAfterLine,
                Anchor::Line {
                    matcher,
                    occurrence,
                },
            ) => {
                let lines = Lines::parse(text);
                let index =
                    locate_line(lines.as_slice(), matcher, *occurrence).map_err(|e| self.fail(e))?;
                self.splice_lines(lines, index)?.render()
            }
            (MutationKind::ReplaceSpan, Anchor::TokenSpan { .. }) => {
                let Location::Block(span) = self.anchor.locate(text).map_err(|e| self.fail(e))?
                else {
                    return Err(self.mismatch());
                };
                let ctx = AnchorContext::at_offset(text, span.start, &text[span.start..span.end]);
                let block = self.payload.render(&ctx);
                replace_span(text, span, &block).map_err(|e| self.fail(e))?
            }
            _ => return Err(self.mismatch()),
        };

        debug!(patch = %self.id, kind = %self.kind, "patch transformed document");
        Ok(result)
    }

    // Insertions go in reverse directly after the anchor line: the anchor
    // keeps its index and indentation throughout, and each insert lands
    // above the previously inserted line, yielding payload order.
    fn splice_lines(&self, lines: Lines, index: usize) -> Result<Lines, PatchError> {
        let anchor_line = lines
            .get(index)
            .ok_or_else(|| {
                self.fail(AnchorError::IndexOutOfRange {
                    index,
                    len: lines.len(),
                })
            })?
            .to_string();
        let ctx = AnchorContext::for_line(&anchor_line, index, lines.ending(index));
        let rendered = self.payload.render_lines(&ctx);

        let (to_insert, replacement) = match self.kind {
            MutationKind::ReplaceLine => match rendered.split_first() {
                Some((first, rest)) => (rest, Some(first)),
                None => {
                    return Err(PatchError::EmptyPayload {
                        id: self.id.clone(),
                    })
                }
            },
            _ => {
                if rendered.is_empty() {
                    return Err(PatchError::EmptyPayload {
                        id: self.id.clone(),
                    });
                }
                (rendered.as_slice(), None)
            }
        };

        let mut lines = lines;
        for line in to_insert.iter().rev() {
            let (next, _) = insert_line_after(lines, index, line).map_err(|e| self.fail(e))?;
            lines = next;
        }

        if let Some(first) = replacement {
            let indent = leading_indent(&anchor_line);
            let content = if first.is_empty() {
                String::new()
            } else {
                format!("{indent}{first}")
            };
            lines = replace_line_at(lines, index, content).map_err(|e| self.fail(e))?;
        }
        Ok(lines)
    }

    fn fail(&self, source: AnchorError) -> PatchError {
        PatchError::Anchor {
            id: self.id.clone(),
            source,
        }
    }

    fn mismatch(&self) -> PatchError {
        PatchError::KindMismatch {
            id: self.id.clone(),
            kind: self.kind,
            anchor: anchor_kind(&self.anchor),
        }
    }
}

fn anchor_kind(anchor: &Anchor) -> &'static str {
    match anchor {
        Anchor::Literal { .. } => "literal",
        Anchor::Line { .. } => "line",
        Anchor::TokenSpan { .. } => "token-span",
    }
}

/// Run `operations` in order, each consuming the snapshot produced by the
/// previous one. Stops at the first failure.
pub fn apply_chain(text: &str, operations: &[PatchOperation]) -> Result<String, PatchError> {
    operations
        .iter()
        .try_fold(text.to_string(), |snapshot, op| op.apply(&snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{LineMatch, Occurrence};

    const LIST_LINE: &str =
        "const list = Array.from(new Set(callParticipants.length ? callParticipants : (dm ? dm.users : [])));";

    fn call_doc() -> String {
        format!(
            "function Banner() {{\n            {LIST_LINE}\n            const label = callState === 'calling' ? 'Calling.' : 'In call';\n            return label;\n}}\n"
        )
    }

    #[test]
    fn test_replace_substring_label() {
        let op = PatchOperation::replace_substring(
            "label",
            Anchor::literal("'Calling.'"),
            "'Calling…'",
        );
        let out = op.apply(&call_doc()).unwrap();
        assert_eq!(out.matches("'Calling…'").count(), 1);
        assert!(!out.contains("'Calling.'"));
    }

    #[test]
    fn test_second_application_fails_not_found() {
        let op = PatchOperation::replace_substring(
            "label",
            Anchor::literal("'Calling.'"),
            "'Calling…'",
        );
        let once = op.apply(&call_doc()).unwrap();
        let err = op.apply(&once).unwrap_err();
        assert!(matches!(
            err.anchor_error(),
            Some(AnchorError::AnchorNotFound { .. })
        ));
    }

    #[test]
    fn test_replace_line_with_two_lines_keeps_indent() {
        let op = PatchOperation::replace_line(
            "participants",
            Anchor::line(LineMatch::Trimmed(LIST_LINE.into())),
            Payload::lines([
                "const fallback = (dm ? dm.users : []).map(user => ({ user, status: 'ringing' as const }));",
                "const participantCards = (callParticipants.length ? callParticipants : fallback).filter(p => !!p.user);",
            ]),
        );
        let out = op.apply(&call_doc()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[1].starts_with("            const fallback = "));
        assert!(lines[2].starts_with("            const participantCards = "));
        assert!(lines[3].contains("const label"));
        assert!(!out.contains("Array.from"));
    }

    #[test]
    fn test_insert_after_line_order() {
        let op = PatchOperation::insert_after_line(
            "insert",
            Anchor::line(LineMatch::Contains("return label".into())),
            Payload::lines(["// one", "  // nested", "// two"]),
        );
        let out = op.apply(&call_doc()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[4], "            // one");
        assert_eq!(lines[5], "              // nested");
        assert_eq!(lines[6], "            // two");
        assert_eq!(lines[7], "}");
    }

    #[test]
    fn test_replace_span_verbatim() {
        let text = "before\n  {open && (\n    <Old />\n  )}\n  {showTipsBanner}\nafter\n";
        let op = PatchOperation::replace_span(
            "block",
            Anchor::token_span("  {open && (", "  {showTipsBanner"),
            "  {open && <New />}\n",
        );
        let out = op.apply(text).unwrap();
        assert_eq!(out, "before\n  {open && <New />}\n  {showTipsBanner}\nafter\n");
    }

    #[test]
    fn test_fixed_index_past_end_is_rejected() {
        let op = PatchOperation::replace_line(
            "fixed",
            Anchor::line(LineMatch::Contains("label".into())).with_occurrence(Occurrence::At(2005)),
            Payload::lines(["x"]),
        );
        let err = op.apply(&call_doc()).unwrap_err();
        assert!(matches!(
            err.anchor_error(),
            Some(AnchorError::IndexOutOfRange { index: 2005, .. })
        ));
    }

    #[test]
    fn test_multiline_substring_in_crlf_document() {
        let text = "a\r\n    x = OLD;\r\nb\r\n";
        let op = PatchOperation::replace_substring(
            "crlf",
            Anchor::literal("OLD"),
            Payload::lines(["first", "second"]),
        );
        let out = op.apply(text).unwrap();
        assert_eq!(out, "a\r\n    x = first\r\n    second;\r\nb\r\n");
    }

    #[test]
    fn test_insert_in_crlf_document_keeps_crlf() {
        let text = "a\r\n  anchor\r\nb\r\n";
        let op = PatchOperation::insert_after_line(
            "crlf",
            Anchor::line(LineMatch::Trimmed("anchor".into())),
            Payload::lines(["x", "y"]),
        );
        let out = op.apply(text).unwrap();
        assert_eq!(out, "a\r\n  anchor\r\n  x\r\n  y\r\nb\r\n");
    }

    #[test]
    fn test_kind_mismatch() {
        let op = PatchOperation::replace_line("bad", Anchor::literal("x"), Payload::text("y"));
        assert!(matches!(op.apply("x"), Err(PatchError::KindMismatch { .. })));
    }

    #[test]
    fn test_empty_line_payload_rejected() {
        let op = PatchOperation::replace_line(
            "empty",
            Anchor::line(LineMatch::Contains("return".into())),
            Payload::lines(Vec::<String>::new()),
        );
        assert!(matches!(
            op.apply(&call_doc()),
            Err(PatchError::EmptyPayload { .. })
        ));
    }

    #[test]
    fn test_chain_stops_at_first_failure() {
        let ops = vec![
            PatchOperation::replace_substring("a", Anchor::literal("'In call'"), "'Live'"),
            PatchOperation::replace_substring("b", Anchor::literal("missing"), "x"),
        ];
        let err = apply_chain(&call_doc(), &ops).unwrap_err();
        assert_eq!(err.id(), "b");
    }

    #[test]
    fn test_chain_sees_previous_snapshot() {
        let ops = vec![
            PatchOperation::replace_substring("a", Anchor::literal("'In call'"), "'Live'"),
            PatchOperation::replace_substring("b", Anchor::literal("'Live'"), "'On air'"),
        ];
        let out = apply_chain(&call_doc(), &ops).unwrap();
        assert!(out.contains("'On air'"));
    }
}
