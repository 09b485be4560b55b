//! Anchor Patcher: anchor-based text patching for generated source files
//!
//! Patches are located by content, never by position alone. Each patch is an
//! anchor (a literal fragment, a line predicate, or a start/end token pair)
//! plus a mutation applied at the anchor.
//!
//! # Architecture
//!
//! Every operation is a pure `&str -> Result<String>` transform. A run loads a
//! document once, threads its text through the whole operation chain in
//! memory, and writes once at the end. Intelligence lives in anchor location;
//! the mutations themselves are plain splices.
//!
//! # Safety
//!
//! - A missing anchor is an error, never a silent no-op
//! - An ambiguous anchor is an error when uniqueness is required
//! - Nothing is written unless every operation in the run succeeded
//! - Atomic file writes (tempfile + fsync + rename)
//! - Targets must live under the project root
//!
//! # Example
//!
//! ```no_run
//! use anchor_patcher::{Anchor, PatchOperation, PatchRunner};
//!
//! let op = PatchOperation::replace_substring(
//!     "call-label",
//!     Anchor::literal("'Calling.'"),
//!     "'Calling\u{2026}'",
//! );
//!
//! match PatchRunner::new().run("src/app/Main.tsx", &[op]) {
//!     Ok(report) => println!("patched {}", report.path.display()),
//!     Err(e) => eprintln!("patch failed: {}", e),
//! }
//! ```

pub mod anchor;
pub mod config;
pub mod document;
pub mod mutate;
pub mod operation;
pub mod recipes;
pub mod runner;
pub mod safety;
pub mod verify;

// Re-exports
pub use anchor::{Anchor, AnchorError, LineMatch, Location, NearMiss, Occurrence, Span};
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, ApplicationError, ConfigError,
    PatchConfig, PatchStatus,
};
pub use document::{DocumentError, SourceDocument};
pub use mutate::{AnchorContext, Lines, Payload};
pub use operation::{apply_chain, MutationKind, PatchError, PatchOperation, PatchState};
pub use runner::{PatchOutcome, PatchPlan, PatchRunner, RunError, RunReport};
pub use safety::{RootGuard, SafetyError};
pub use verify::{check_presence, probe, ProbeStatus};
