//! Near-miss lookup for anchors that did not match.
//!
//! When a literal anchor is missing, the usual cause is that the generated
//! document drifted by a few characters. Reporting the most similar line saves
//! the operator from diffing by hand.

use crate::anchor::errors::NearMiss;

/// Minimum normalized Levenshtein similarity for a line to be reported.
pub const NEAR_MISS_THRESHOLD: f64 = 0.6;

/// Find the line of `text` most similar to the first non-blank line of
/// `needle`.
pub fn closest_line(text: &str, needle: &str) -> Option<NearMiss> {
    let probe = needle.lines().map(str::trim).find(|l| !l.is_empty())?;
    closest_in(text.lines(), probe)
}

/// Same as [`closest_line`] over an already-split line sequence.
pub fn closest_in<'a, I>(lines: I, probe: &str) -> Option<NearMiss>
where
    I: IntoIterator<Item = &'a str>,
{
    let probe = probe.trim();
    if probe.is_empty() {
        return None;
    }

    let mut best: Option<NearMiss> = None;
    for (idx, line) in lines.into_iter().enumerate() {
        let candidate = line.trim();
        if candidate.is_empty() || !comparable_length(candidate, probe) {
            continue;
        }
        let score = strsim::normalized_levenshtein(candidate, probe);
        if score < NEAR_MISS_THRESHOLD {
            continue;
        }
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(NearMiss {
                line: idx + 1,
                text: candidate.to_string(),
                score,
            });
        }
    }
    best
}

// Lines more than twice as long (or short) as the probe can never clear the
// threshold; skipping them keeps the scan linear on large documents.
fn comparable_length(a: &str, b: &str) -> bool {
    let (a, b) = (a.chars().count(), b.chars().count());
    a <= b * 2 && b <= a * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_drifted_line() {
        let text = "const a = 1;\n    const label = 'Calling...';\nconst b = 2;\n";
        let miss = closest_line(text, "const label = 'Calling.';").unwrap();
        assert_eq!(miss.line, 2);
        assert_eq!(miss.text, "const label = 'Calling...';");
        assert!(miss.score >= NEAR_MISS_THRESHOLD);
    }

    #[test]
    fn ignores_unrelated_text() {
        let text = "fn main() {}\nlet x = 5;\n";
        assert!(closest_line(text, "const label = 'Calling.';").is_none());
    }

    #[test]
    fn blank_needle_has_no_hint() {
        assert!(closest_line("anything", "   \n  ").is_none());
    }
}
