use crate::anchor::errors::AnchorError;
use crate::anchor::hint::{closest_in, closest_line};
use crate::mutate::Lines;
use std::fmt;
use tracing::{debug, warn};

/// Where an anchor is expected to be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occurrence {
    /// Take the first match, ignoring any later ones.
    First,
    /// Exactly one match is required.
    #[default]
    Unique,
    /// Expected at a fixed position (byte offset for text anchors, line index
    /// for line anchors). The position is a hint: if the anchor is no longer
    /// there it is re-derived by unique content search.
    At(usize),
}

/// Line-content predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMatch {
    /// Whole line equals the text, including indentation
    Equals(String),
    /// Line equals the text once surrounding whitespace is stripped from both
    Trimmed(String),
    /// Line contains the text
    Contains(String),
}

impl LineMatch {
    pub fn matches(&self, line: &str) -> bool {
        match self {
            LineMatch::Equals(text) => line == text,
            LineMatch::Trimmed(text) => line.trim() == text.trim(),
            LineMatch::Contains(text) => !text.is_empty() && line.contains(text.as_str()),
        }
    }

    /// The literal text this predicate looks for.
    pub fn needle(&self) -> &str {
        match self {
            LineMatch::Equals(text) | LineMatch::Trimmed(text) | LineMatch::Contains(text) => text,
        }
    }
}

impl fmt::Display for LineMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineMatch::Equals(text) => write!(f, "line == {text:?}"),
            LineMatch::Trimmed(text) => write!(f, "line.trim() == {:?}", text.trim()),
            LineMatch::Contains(text) => write!(f, "line contains {text:?}"),
        }
    }
}

/// A half-open byte range `[start, end)` of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A known fragment used to locate a mutation point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// A literal substring
    Literal { text: String, occurrence: Occurrence },
    /// A line matching a predicate
    Line {
        matcher: LineMatch,
        occurrence: Occurrence,
    },
    /// The block from a start token up to (not including) the first end token
    /// after it
    TokenSpan {
        start: String,
        end: String,
        occurrence: Occurrence,
    },
}

/// Resolved position of an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Byte span of a literal match
    Text(Span),
    /// Line index (0-based)
    Line(usize),
    /// Token-delimited block
    Block(Span),
}

impl Anchor {
    pub fn literal(text: impl Into<String>) -> Self {
        Anchor::Literal {
            text: text.into(),
            occurrence: Occurrence::Unique,
        }
    }

    pub fn line(matcher: LineMatch) -> Self {
        Anchor::Line {
            matcher,
            occurrence: Occurrence::Unique,
        }
    }

    /// Token span anchors default to the first start token, matching how
    /// block rewrites are normally authored.
    pub fn token_span(start: impl Into<String>, end: impl Into<String>) -> Self {
        Anchor::TokenSpan {
            start: start.into(),
            end: end.into(),
            occurrence: Occurrence::First,
        }
    }

    /// Replace the expected-location policy.
    pub fn with_occurrence(mut self, policy: Occurrence) -> Self {
        match &mut self {
            Anchor::Literal { occurrence, .. }
            | Anchor::Line { occurrence, .. }
            | Anchor::TokenSpan { occurrence, .. } => *occurrence = policy,
        }
        self
    }

    pub fn occurrence(&self) -> Occurrence {
        match self {
            Anchor::Literal { occurrence, .. }
            | Anchor::Line { occurrence, .. }
            | Anchor::TokenSpan { occurrence, .. } => *occurrence,
        }
    }

    /// Short human-readable description used in logs and reports.
    pub fn describe(&self) -> String {
        match self {
            Anchor::Literal { text, .. } => format!("literal {}", abbreviate(text)),
            Anchor::Line { matcher, .. } => matcher.to_string(),
            Anchor::TokenSpan { start, end, .. } => {
                format!("span {} .. {}", abbreviate(start), abbreviate(end))
            }
        }
    }

    /// Resolve this anchor against document text.
    pub fn locate(&self, text: &str) -> Result<Location, AnchorError> {
        match self {
            Anchor::Literal { text: literal, occurrence } => {
                let offset = locate_substring(text, literal, *occurrence)?;
                Ok(Location::Text(Span::new(offset, offset + literal.len())))
            }
            Anchor::Line { matcher, occurrence } => {
                let lines = Lines::parse(text);
                locate_line(lines.as_slice(), matcher, *occurrence).map(Location::Line)
            }
            Anchor::TokenSpan {
                start,
                end,
                occurrence,
            } => locate_anchored_span(text, start, end, *occurrence).map(Location::Block),
        }
    }
}

/// Find `literal` in `text` according to `occurrence`, returning its byte
/// offset.
pub fn locate_substring(
    text: &str,
    literal: &str,
    occurrence: Occurrence,
) -> Result<usize, AnchorError> {
    if literal.is_empty() {
        return Err(AnchorError::not_found(literal, None));
    }

    let offset = match occurrence {
        Occurrence::First => text
            .find(literal)
            .ok_or_else(|| AnchorError::not_found(literal, closest_line(text, literal)))?,
        Occurrence::Unique => unique_substring(text, literal)?,
        Occurrence::At(expected) => {
            if expected >= text.len() {
                return Err(AnchorError::IndexOutOfRange {
                    index: expected,
                    len: text.len(),
                });
            }
            if text
                .get(expected..)
                .is_some_and(|rest| rest.starts_with(literal))
            {
                expected
            } else {
                let found = unique_substring(text, literal)?;
                warn!(
                    anchor = %abbreviate(literal),
                    expected,
                    found,
                    "anchor drifted from its recorded offset"
                );
                found
            }
        }
    };

    debug!(anchor = %abbreviate(literal), offset, "located literal anchor");
    Ok(offset)
}

fn unique_substring(text: &str, literal: &str) -> Result<usize, AnchorError> {
    let mut occurrences = text.match_indices(literal);
    let first = occurrences
        .next()
        .ok_or_else(|| AnchorError::not_found(literal, closest_line(text, literal)))?;
    if occurrences.next().is_some() {
        return Err(AnchorError::AnchorAmbiguous {
            anchor: literal.to_string(),
            count: text.matches(literal).count(),
        });
    }
    Ok(first.0)
}

/// Find the index of the line satisfying `matcher`.
pub fn locate_line<S: AsRef<str>>(
    lines: &[S],
    matcher: &LineMatch,
    occurrence: Occurrence,
) -> Result<usize, AnchorError> {
    let index = match occurrence {
        Occurrence::First => lines
            .iter()
            .position(|line| matcher.matches(line.as_ref()))
            .ok_or_else(|| line_not_found(lines, matcher))?,
        Occurrence::Unique => unique_line(lines, matcher)?,
        Occurrence::At(expected) => {
            let line = lines.get(expected).ok_or(AnchorError::IndexOutOfRange {
                index: expected,
                len: lines.len(),
            })?;
            if matcher.matches(line.as_ref()) {
                expected
            } else {
                let found = unique_line(lines, matcher)?;
                warn!(
                    anchor = %matcher,
                    expected,
                    found,
                    "line anchor drifted from its recorded index"
                );
                found
            }
        }
    };

    debug!(anchor = %matcher, index, "located line anchor");
    Ok(index)
}

fn unique_line<S: AsRef<str>>(lines: &[S], matcher: &LineMatch) -> Result<usize, AnchorError> {
    let mut hits = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| matcher.matches(line.as_ref()))
        .map(|(idx, _)| idx);
    let first = hits.next().ok_or_else(|| line_not_found(lines, matcher))?;
    let extra = hits.count();
    if extra > 0 {
        return Err(AnchorError::AnchorAmbiguous {
            anchor: matcher.to_string(),
            count: extra + 1,
        });
    }
    Ok(first)
}

fn line_not_found<S: AsRef<str>>(lines: &[S], matcher: &LineMatch) -> AnchorError {
    let closest = closest_in(lines.iter().map(AsRef::as_ref), matcher.needle());
    AnchorError::not_found(matcher.to_string(), closest)
}

/// Find the block starting at the first `start` token at or after
/// `search_from` and ending where the next `end` token begins.
///
/// The end token is searched for strictly after the start token, and is not
/// part of the returned span.
pub fn locate_token_span(
    text: &str,
    start: &str,
    end: &str,
    search_from: usize,
) -> Result<Span, AnchorError> {
    let rest = text.get(search_from..).ok_or(AnchorError::IndexOutOfRange {
        index: search_from,
        len: text.len(),
    })?;
    if start.is_empty() {
        return Err(AnchorError::StartTokenNotFound {
            token: start.to_string(),
            search_from,
        });
    }
    let start_offset = rest
        .find(start)
        .map(|rel| search_from + rel)
        .ok_or_else(|| AnchorError::StartTokenNotFound {
            token: start.to_string(),
            search_from,
        })?;

    let after = start_offset + start.len();
    if end.is_empty() {
        return Err(AnchorError::EndTokenNotFound {
            token: end.to_string(),
            after,
        });
    }
    let end_offset = text[after..]
        .find(end)
        .map(|rel| after + rel)
        .ok_or_else(|| AnchorError::EndTokenNotFound {
            token: end.to_string(),
            after,
        })?;

    let span = Span::new(start_offset, end_offset);
    debug!(start = %abbreviate(start), end = %abbreviate(end), %span, "located token span");
    Ok(span)
}

fn locate_anchored_span(
    text: &str,
    start: &str,
    end: &str,
    occurrence: Occurrence,
) -> Result<Span, AnchorError> {
    match occurrence {
        Occurrence::First => locate_token_span(text, start, end, 0),
        Occurrence::Unique => {
            let span = locate_token_span(text, start, end, 0)?;
            let count = text.matches(start).count();
            if count > 1 {
                return Err(AnchorError::AnchorAmbiguous {
                    anchor: start.to_string(),
                    count,
                });
            }
            Ok(span)
        }
        Occurrence::At(expected) => {
            if expected >= text.len() {
                return Err(AnchorError::IndexOutOfRange {
                    index: expected,
                    len: text.len(),
                });
            }
            let at_hint = !start.is_empty()
                && text.get(expected..).is_some_and(|rest| rest.starts_with(start));
            if at_hint {
                locate_token_span(text, start, end, expected)
            } else {
                let span = locate_anchored_span(text, start, end, Occurrence::Unique)?;
                warn!(
                    anchor = %abbreviate(start),
                    expected,
                    found = span.start,
                    "start token drifted from its recorded offset"
                );
                Ok(span)
            }
        }
    }
}

/// First line of `text`, trimmed and cut to 60 characters.
pub(crate) fn abbreviate(text: &str) -> String {
    const MAX: usize = 60;
    let first = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let mut out: String = first.chars().take(MAX).collect();
    if first.chars().count() > MAX || text.trim().lines().count() > 1 {
        out.push('…');
    }
    format!("{out:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "function Call() {\n    const a = 1;\n    const label = callState === 'calling' ? 'Calling.' : 'In call';\n    return label;\n}\n";

    #[test]
    fn test_locate_substring_unique() {
        let offset = locate_substring(DOC, "'Calling.'", Occurrence::Unique).unwrap();
        assert_eq!(&DOC[offset..offset + 10], "'Calling.'");
    }

    #[test]
    fn test_locate_substring_missing() {
        let err = locate_substring(DOC, "'Ringing.'", Occurrence::First).unwrap_err();
        assert!(matches!(err, AnchorError::AnchorNotFound { .. }));
    }

    #[test]
    fn test_locate_substring_ambiguous() {
        let err = locate_substring(DOC, "const", Occurrence::Unique).unwrap_err();
        assert_eq!(
            err,
            AnchorError::AnchorAmbiguous {
                anchor: "const".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn test_locate_substring_first_tolerates_repeats() {
        let offset = locate_substring(DOC, "const", Occurrence::First).unwrap();
        assert_eq!(offset, DOC.find("const").unwrap());
    }

    #[test]
    fn test_locate_substring_empty_literal_never_matches() {
        assert!(locate_substring(DOC, "", Occurrence::First).is_err());
    }

    #[test]
    fn test_fixed_offset_past_end() {
        let err = locate_substring(DOC, "label", Occurrence::At(DOC.len() + 10)).unwrap_err();
        assert!(matches!(err, AnchorError::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_fixed_offset_rederived_after_drift() {
        let real = DOC.find("return").unwrap();
        let offset = locate_substring(DOC, "return", Occurrence::At(real - 3)).unwrap();
        assert_eq!(offset, real);
    }

    #[test]
    fn test_locate_line_trimmed() {
        let lines: Vec<&str> = DOC.lines().collect();
        let idx = locate_line(
            &lines,
            &LineMatch::Trimmed("return label;".into()),
            Occurrence::Unique,
        )
        .unwrap();
        assert_eq!(idx, 3);
    }

    #[test]
    fn test_locate_line_fixed_index_out_of_range() {
        let lines: Vec<&str> = DOC.lines().collect();
        let err = locate_line(
            &lines,
            &LineMatch::Contains("label".into()),
            Occurrence::At(2005),
        )
        .unwrap_err();
        assert_eq!(
            err,
            AnchorError::IndexOutOfRange {
                index: 2005,
                len: 5
            }
        );
    }

    #[test]
    fn test_locate_line_fixed_index_drift() {
        let lines: Vec<&str> = DOC.lines().collect();
        let idx = locate_line(
            &lines,
            &LineMatch::Trimmed("return label;".into()),
            Occurrence::At(1),
        )
        .unwrap();
        assert_eq!(idx, 3);
    }

    #[test]
    fn test_line_not_found_carries_hint() {
        let lines: Vec<&str> = DOC.lines().collect();
        let err = locate_line(
            &lines,
            &LineMatch::Trimmed("return labels;".into()),
            Occurrence::Unique,
        )
        .unwrap_err();
        match err {
            AnchorError::AnchorNotFound { closest, .. } => {
                assert_eq!(closest.unwrap().line, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_token_span_excludes_end_token() {
        let text = "head <A> body </A> tail";
        let span = locate_token_span(text, "<A>", "</A>", 0).unwrap();
        assert_eq!(&text[span.start..span.end], "<A> body ");
    }

    #[test]
    fn test_token_span_end_searched_after_start() {
        let text = "END before START middle END after";
        let span = locate_token_span(text, "START", "END", 0).unwrap();
        assert_eq!(&text[span.start..span.end], "START middle ");
    }

    #[test]
    fn test_token_span_missing_tokens() {
        let text = "alpha beta";
        assert!(matches!(
            locate_token_span(text, "gamma", "beta", 0),
            Err(AnchorError::StartTokenNotFound { .. })
        ));
        assert!(matches!(
            locate_token_span(text, "alpha", "gamma", 0),
            Err(AnchorError::EndTokenNotFound { .. })
        ));
    }

    #[test]
    fn test_token_span_search_from() {
        let text = "[a] [b] end";
        let span = locate_token_span(text, "[", "end", 1).unwrap();
        assert_eq!(span.start, 4);
    }

    #[test]
    fn test_token_span_unique_counts_start_tokens() {
        let text = "<S> one <E>\n<S> two <E>\n";
        let err = Anchor::token_span("<S>", "<E>")
            .with_occurrence(Occurrence::Unique)
            .locate(text)
            .unwrap_err();
        assert_eq!(
            err,
            AnchorError::AnchorAmbiguous {
                anchor: "<S>".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn test_token_span_fixed_offset_exact() {
        let text = "<S> one <E>\n<S> two <E>\n";
        let second = text.rfind("<S>").unwrap();
        let span = Anchor::token_span("<S>", "<E>")
            .with_occurrence(Occurrence::At(second))
            .locate(text)
            .unwrap();
        assert_eq!(span, Location::Block(Span::new(second, second + "<S> two ".len())));
    }

    #[test]
    fn test_token_span_fixed_offset_drifted_earlier() {
        let text = "head\n<S> body <E>\ntail line that is long enough\n";
        let real = text.find("<S>").unwrap();
        let span = Anchor::token_span("<S>", "<E>")
            .with_occurrence(Occurrence::At(real + 10))
            .locate(text)
            .unwrap();
        assert_eq!(span, Location::Block(Span::new(real, real + "<S> body ".len())));
    }

    #[test]
    fn test_token_span_fixed_offset_inside_multibyte_char() {
        let text = "“quoted” <S> body <E>\n";
        let real = text.find("<S>").unwrap();
        assert!(!text.is_char_boundary(1));
        let span = Anchor::token_span("<S>", "<E>")
            .with_occurrence(Occurrence::At(1))
            .locate(text)
            .unwrap();
        assert_eq!(span, Location::Block(Span::new(real, real + "<S> body ".len())));
    }

    #[test]
    fn test_token_span_fixed_offset_drift_must_be_unique() {
        let text = "<S> one <E>\n<S> two <E>\n";
        let err = Anchor::token_span("<S>", "<E>")
            .with_occurrence(Occurrence::At(5))
            .locate(text)
            .unwrap_err();
        assert!(matches!(err, AnchorError::AnchorAmbiguous { count: 2, .. }));

        let err = Anchor::token_span("<S>", "<E>")
            .with_occurrence(Occurrence::At(text.len()))
            .locate(text)
            .unwrap_err();
        assert!(matches!(err, AnchorError::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_line_anchor_indices_match_mixed_endings() {
        let text = "keep_a\nTARGET\nkeep_c\r\nkeep_d\n";
        let line = Anchor::line(LineMatch::Equals("keep_c".into()));
        assert_eq!(line.locate(text).unwrap(), Location::Line(2));
        let line = Anchor::line(LineMatch::Contains("TARGET".into()));
        assert_eq!(line.locate(text).unwrap(), Location::Line(1));
    }

    #[test]
    fn test_anchor_locate_variants() {
        let literal = Anchor::literal("'In call'");
        assert!(matches!(literal.locate(DOC), Ok(Location::Text(_))));

        let line = Anchor::line(LineMatch::Contains("const a".into()));
        assert_eq!(line.locate(DOC).unwrap(), Location::Line(1));

        let span = Anchor::token_span("const label", "return");
        assert!(matches!(span.locate(DOC), Ok(Location::Block(_))));
    }

    #[test]
    fn test_abbreviate_multiline() {
        assert_eq!(abbreviate("  first\nsecond"), "\"first…\"");
        assert_eq!(abbreviate("short"), "\"short\"");
    }
}
