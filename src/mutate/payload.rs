//! Replacement payloads.
//!
//! Payload construction is kept apart from span location: a payload only sees
//! the [`AnchorContext`] captured at the located anchor, never the document.

use std::fmt;
use std::sync::Arc;

/// What was captured at a located anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorContext {
    /// Leading whitespace of the line the anchor starts on
    pub indent: String,
    /// Text the anchor matched
    pub matched: String,
    /// 0-based line index the anchor starts on
    pub line: usize,
    /// Line terminator used around the anchor (`\n` or `\r\n`)
    pub newline: &'static str,
}

impl Default for AnchorContext {
    fn default() -> Self {
        Self {
            indent: String::new(),
            matched: String::new(),
            line: 0,
            newline: "\n",
        }
    }
}

impl AnchorContext {
    /// Capture context for a match starting at byte `offset` and covering
    /// `matched`.
    pub fn at_offset(text: &str, offset: usize, matched: &str) -> Self {
        let line_start = text[..offset].rfind('\n').map_or(0, |nl| nl + 1);
        let line_text = &text[line_start..];
        let indent_len = line_text.len() - line_text.trim_start_matches([' ', '\t']).len();
        // The anchor line's own terminator, or the previous line's when the
        // anchor sits on an unterminated last line.
        let newline = match text[offset..].find('\n') {
            Some(rel) if text[..offset + rel].ends_with('\r') => "\r\n",
            Some(_) => "\n",
            None if text[..line_start].ends_with("\r\n") => "\r\n",
            None => "\n",
        };
        Self {
            indent: line_text[..indent_len].to_string(),
            matched: matched.to_string(),
            line: text[..offset].matches('\n').count(),
            newline,
        }
    }

    pub fn for_line(line_text: &str, line: usize, newline: &'static str) -> Self {
        Self {
            indent: crate::mutate::lines::leading_indent(line_text).to_string(),
            matched: line_text.to_string(),
            line,
            newline,
        }
    }
}

type RenderFn = dyn Fn(&AnchorContext) -> String + Send + Sync;

/// Replacement content for a patch operation.
#[derive(Clone)]
pub enum Payload {
    /// Literal text, inserted as-is
    Text(String),
    /// Lines relative to the anchor's indentation
    Lines(Vec<String>),
    /// Text computed from the captured anchor context
    Computed(Arc<RenderFn>),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Payload::Lines(lines.into_iter().map(Into::into).collect())
    }

    pub fn computed<F>(render: F) -> Self
    where
        F: Fn(&AnchorContext) -> String + Send + Sync + 'static,
    {
        Payload::Computed(Arc::new(render))
    }

    /// Render as inline text.
    ///
    /// `Lines` payloads continue from the match position, so every line after
    /// the first is prefixed with the anchor's indentation and joined with the
    /// anchor's line terminator.
    pub fn render(&self, ctx: &AnchorContext) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Lines(lines) => {
                let mut out = String::new();
                for (idx, line) in lines.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(ctx.newline);
                        if !line.is_empty() {
                            out.push_str(&ctx.indent);
                        }
                    }
                    out.push_str(line);
                }
                out
            }
            Payload::Computed(render) => render(ctx),
        }
    }

    /// Render as a line sequence, each entry relative to the anchor line's
    /// indentation.
    pub fn render_lines(&self, ctx: &AnchorContext) -> Vec<String> {
        match self {
            Payload::Lines(lines) => lines.clone(),
            other => other.render(ctx).lines().map(str::to_string).collect(),
        }
    }

    /// The literal content, when it does not depend on the anchor.
    pub fn as_literal(&self) -> Option<String> {
        match self {
            Payload::Text(text) => Some(text.clone()),
            Payload::Lines(lines) => lines.first().cloned(),
            Payload::Computed(_) => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Lines(lines) => f.debug_tuple("Lines").field(lines).finish(),
            Payload::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::text(text)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}
