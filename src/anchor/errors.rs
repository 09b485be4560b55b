use thiserror::Error;

/// The closest line to a missing anchor, reported so a drifted document is
/// easy to diagnose.
#[derive(Debug, Clone, PartialEq)]
pub struct NearMiss {
    /// 1-based line number
    pub line: usize,
    pub text: String,
    /// Normalized similarity in `[0, 1]`
    pub score: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnchorError {
    #[error("anchor not found: {anchor:?}{}", near_miss_suffix(.closest))]
    AnchorNotFound {
        anchor: String,
        closest: Option<NearMiss>,
    },

    #[error("anchor {anchor:?} matched {count} locations, expected exactly 1")]
    AnchorAmbiguous { anchor: String, count: usize },

    #[error("start token not found at or after byte {search_from}: {token:?}")]
    StartTokenNotFound { token: String, search_from: usize },

    #[error("end token not found after byte {after}: {token:?}")]
    EndTokenNotFound { token: String, after: usize },

    #[error("index {index} out of range for document of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

impl AnchorError {
    pub(crate) fn not_found(anchor: impl Into<String>, closest: Option<NearMiss>) -> Self {
        AnchorError::AnchorNotFound {
            anchor: anchor.into(),
            closest,
        }
    }

    /// Whether this error means the anchor is simply absent (as opposed to
    /// ambiguous or out of range).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AnchorError::AnchorNotFound { .. }
                | AnchorError::StartTokenNotFound { .. }
                | AnchorError::EndTokenNotFound { .. }
        )
    }
}

fn near_miss_suffix(closest: &Option<NearMiss>) -> String {
    match closest {
        Some(miss) => format!(
            " (closest is line {}: {:?}, {:.0}% similar)",
            miss.line,
            miss.text,
            miss.score * 100.0
        ),
        None => String::new(),
    }
}
