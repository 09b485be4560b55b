//! Anchor location over plain document text.
//!
//! An anchor is a literal fragment, a line predicate, or a start/end token
//! pair. Locating one never guesses: a missing anchor is an error, and so is
//! an ambiguous one when uniqueness is required.

pub mod errors;
pub mod hint;
pub mod locator;

pub use errors::{AnchorError, NearMiss};
pub use hint::closest_line;
pub use locator::{
    locate_line, locate_substring, locate_token_span, Anchor, LineMatch, Location, Occurrence,
    Span,
};
