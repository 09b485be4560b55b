use crate::anchor::{locate_token_span, AnchorError, Span};
use tracing::debug;

/// Replace `text[span]` with `block`.
///
/// The result is `text[..span.start] + block + text[span.end..]`. The block is
/// inserted verbatim; its internal structure is the caller's concern.
pub fn replace_span(text: &str, span: Span, block: &str) -> Result<String, AnchorError> {
    if span.start > span.end || span.end > text.len() {
        return Err(AnchorError::IndexOutOfRange {
            index: span.end.max(span.start),
            len: text.len(),
        });
    }
    if !text.is_char_boundary(span.start) {
        return Err(AnchorError::IndexOutOfRange {
            index: span.start,
            len: text.len(),
        });
    }
    if !text.is_char_boundary(span.end) {
        return Err(AnchorError::IndexOutOfRange {
            index: span.end,
            len: text.len(),
        });
    }

    let mut out = String::with_capacity(text.len() - span.len() + block.len());
    out.push_str(&text[..span.start]);
    out.push_str(block);
    out.push_str(&text[span.end..]);
    Ok(out)
}

/// Swap the block delimited by `start` and the first `end` after it.
///
/// Returns the new text and the span that was replaced in the original.
pub fn replace_block(
    text: &str,
    start: &str,
    end: &str,
    search_from: usize,
    block: &str,
) -> Result<(String, Span), AnchorError> {
    let span = locate_token_span(text, start, end, search_from)?;
    let replaced = replace_span(text, span, block)?;
    debug!(
        %span,
        removed = span.len(),
        inserted = block.len(),
        "replaced token-delimited block"
    );
    Ok((replaced, span))
}
