use crate::anchor::AnchorError;
use tracing::trace;

/// An ordered line sequence that renders back to the exact text it was parsed
/// from.
///
/// Every line keeps its own terminator (`\n`, `\r\n`, or none for an
/// unterminated last line), so documents with mixed line endings split on
/// every `\n` and render byte for byte. Line content never includes the
/// terminator.
///
/// Mutations consume a `Lines` and return a new one, so each step of a
/// multi-line edit works on the sequence produced by the step before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lines {
    lines: Vec<String>,
    endings: Vec<&'static str>,
}

impl Lines {
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut endings = Vec::new();
        for chunk in text.split_inclusive('\n') {
            let (content, ending) = if let Some(content) = chunk.strip_suffix("\r\n") {
                (content, "\r\n")
            } else if let Some(content) = chunk.strip_suffix('\n') {
                (content, "\n")
            } else {
                (chunk, "")
            };
            lines.push(content.to_string());
            endings.push(ending);
        }
        Self { lines, endings }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (line, ending) in self.lines.iter().zip(&self.endings) {
            out.push_str(line);
            out.push_str(ending);
        }
        out
    }

    pub fn as_slice(&self) -> &[String] {
        &self.lines
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Terminator of the line at `index`, falling back to the document's
    /// dominant one when that line is the unterminated last line.
    pub fn ending(&self, index: usize) -> &'static str {
        match self.endings.get(index) {
            Some(ending) if !ending.is_empty() => *ending,
            _ => self.terminator(),
        }
    }

    /// The most common terminator in the document, `\n` on a tie or when no
    /// line is terminated.
    pub fn terminator(&self) -> &'static str {
        let crlf = self.endings.iter().filter(|e| **e == "\r\n").count();
        let lf = self.endings.iter().filter(|e| **e == "\n").count();
        if crlf > lf {
            "\r\n"
        } else {
            "\n"
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn check(&self, index: usize) -> Result<(), AnchorError> {
        if index >= self.lines.len() {
            return Err(AnchorError::IndexOutOfRange {
                index,
                len: self.lines.len(),
            });
        }
        Ok(())
    }
}

/// Leading whitespace of `line`.
pub fn leading_indent(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// Replace the line at `index` with `content`, verbatim.
pub fn replace_line_at(
    mut lines: Lines,
    index: usize,
    content: impl Into<String>,
) -> Result<Lines, AnchorError> {
    lines.check(index)?;
    let content = content.into();
    trace!(index, content = %content, "replacing line");
    lines.lines[index] = content;
    Ok(lines)
}

/// Insert `content` immediately after the line at `index`, prefixed with that
/// line's indentation.
///
/// Returns the new sequence and the index of the inserted line. Every line
/// after `index` moves down by one; callers must take later indices from the
/// returned sequence. Empty content inserts an empty line with no indentation.
pub fn insert_line_after(
    lines: Lines,
    index: usize,
    content: &str,
) -> Result<(Lines, usize), AnchorError> {
    lines.check(index)?;
    let line = if content.is_empty() {
        String::new()
    } else {
        format!("{}{}", leading_indent(&lines.lines[index]), content)
    };
    insert_verbatim_after(lines, index, line)
}

/// Insert `line` immediately after `index` without touching its indentation.
pub fn insert_verbatim_after(
    mut lines: Lines,
    index: usize,
    line: impl Into<String>,
) -> Result<(Lines, usize), AnchorError> {
    lines.check(index)?;
    let line = line.into();
    trace!(after = index, content = %line, "inserting line");
    // The inserted line inherits the anchor's terminator; an unterminated
    // anchor gains the document's and hands its missing one down.
    let ending = lines.endings[index];
    if ending.is_empty() {
        lines.endings[index] = lines.terminator();
    }
    lines.lines.insert(index + 1, line);
    lines.endings.insert(index + 1, ending);
    Ok((lines, index + 1))
}
