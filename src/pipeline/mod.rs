//! Pipeline stages for document-to-Markdown conversion.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the engine in [`crate::convert`] only wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ detect ──▶ dispatch ──▶ postprocess
//! (path)   (hypotheses) (registry)   (normalise)
//! ```
//!
//! 1. [`input`]       — validate a user-supplied path and open it
//! 2. [`detect`]      — the detection cascade: hints + leading bytes → ordered hypotheses
//! 3. [`registry`]    — converters in priority order
//! 4. [`dispatch`]    — hypotheses × converters with failure isolation
//! 5. [`postprocess`] — whitespace normalisation applied to every result

pub mod detect;
pub mod dispatch;
pub mod input;
pub mod postprocess;
pub mod registry;
