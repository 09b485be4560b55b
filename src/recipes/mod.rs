//! Built-in patch recipes for the active-call banner in the generated chat
//! client (`src/app/Main.tsx`).
//!
//! Each recipe is a fixed sequence of operations with no configuration. The
//! anchors describe one revision of the document; a recipe that no longer
//! matches is rejected rather than guessed at.

use crate::anchor::{Anchor, LineMatch, Occurrence};
use crate::mutate::Payload;
use crate::operation::PatchOperation;

/// Document the recipes are written against, relative to the project root.
pub const DEFAULT_TARGET: &str = "src/app/Main.tsx";

pub const LIST_LINE: &str = "const list = Array.from(new Set(callParticipants.length ? callParticipants : (dm ? dm.users : [])));";

pub const LABEL_LINE: &str = "const label = callState === 'calling' ? 'Calling.' : 'In call';";

pub const LABEL_LINE_PATCHED: &str =
    "const label = callState === 'calling' ? 'Calling\u{2026}' : 'In call';";

pub const FALLBACK_LINE: &str =
    "const fallback = (dm ? dm.users : []).map(user => ({ user, status: 'ringing' as const }));";

pub const PARTICIPANT_CARDS_LINE: &str = "const participantCards = (callParticipants.length ? callParticipants : fallback).filter(p => !!p.user);";

/// Line index of the participant list when the banner was last inspected.
/// Only a hint; the line is re-derived by content if it moved.
pub const LIST_LINE_INDEX: usize = 2005;

pub const CALL_BANNER_START: &str = "          {selectedHaven === \"__dms__\" && selectedDM && activeCallDM === selectedDM && callState !== 'idle' && (() => {";

pub const CALL_BANNER_END: &str = "          {showTipsBanner";

/// Replacement for the whole active-call banner, inserted verbatim.
pub const CALL_BANNER_BLOCK: &str = include_str!("call_banner.tsx");

/// A named, fixed sequence of operations.
#[derive(Debug, Clone, Copy)]
pub struct Recipe {
    pub name: &'static str,
    pub summary: &'static str,
    build: fn() -> Vec<PatchOperation>,
}

impl Recipe {
    pub fn operations(&self) -> Vec<PatchOperation> {
        (self.build)()
    }
}

static RECIPES: &[Recipe] = &[
    Recipe {
        name: "call-label",
        summary: "Use an ellipsis character in the 'Calling' label",
        build: call_label,
    },
    Recipe {
        name: "call-participants",
        summary: "Replace the deduplicated participant list with ringing fallback cards",
        build: call_participants,
    },
    Recipe {
        name: "call-block",
        summary: "Participant cards plus the ellipsis label, as one edit",
        build: call_block,
    },
    Recipe {
        name: "call-banner",
        summary: "Rewrite the whole active-call banner block",
        build: call_banner,
    },
];

pub fn all() -> &'static [Recipe] {
    RECIPES
}

pub fn find(name: &str) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| r.name == name)
}

fn label_op() -> PatchOperation {
    PatchOperation::replace_substring(
        "call-label",
        Anchor::literal(LABEL_LINE).with_occurrence(Occurrence::First),
        LABEL_LINE_PATCHED,
    )
}

fn participants_op(occurrence: Occurrence) -> PatchOperation {
    PatchOperation::replace_line(
        "call-participants",
        Anchor::line(LineMatch::Trimmed(LIST_LINE.to_string())).with_occurrence(occurrence),
        Payload::lines([FALLBACK_LINE, PARTICIPANT_CARDS_LINE]),
    )
}

fn call_label() -> Vec<PatchOperation> {
    vec![label_op()]
}

fn call_participants() -> Vec<PatchOperation> {
    vec![participants_op(Occurrence::First)]
}

// The label line is found by content after the list line has been replaced,
// never by its old index plus an offset.
fn call_block() -> Vec<PatchOperation> {
    vec![
        participants_op(Occurrence::At(LIST_LINE_INDEX)),
        PatchOperation::replace_line(
            "call-label-line",
            Anchor::line(LineMatch::Trimmed(LABEL_LINE.to_string()))
                .with_occurrence(Occurrence::First),
            Payload::lines([LABEL_LINE_PATCHED]),
        ),
    ]
}

fn call_banner() -> Vec<PatchOperation> {
    vec![PatchOperation::replace_span(
        "call-banner",
        Anchor::token_span(CALL_BANNER_START, CALL_BANNER_END),
        CALL_BANNER_BLOCK,
    )
    .with_applied_marker(Anchor::literal(PARTICIPANT_CARDS_LINE))]
}
