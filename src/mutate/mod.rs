//! Pure text transforms: line splicing, span replacement, and the payloads
//! they insert.

pub mod block;
pub mod lines;
pub mod payload;

pub use block::{replace_block, replace_span};
pub use lines::{
    insert_line_after, insert_verbatim_after, leading_indent, replace_line_at, Lines,
};
pub use payload::{AnchorContext, Payload};
