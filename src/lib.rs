//! # edgequake-doc2md
//!
//! Convert documents and archives to Markdown through a priority-ordered
//! registry of pluggable converters.
//!
//! ## Why this crate?
//!
//! Inputs rarely say what they are. A file called `report` may be a DOCX, a
//! download may carry a misleading `Content-Type`, and a zip may hold a mix
//! of everything. This crate builds an ordered list of hypotheses about the
//! bytes (explicit hint, file name, declared type, leading-byte signature)
//! and offers each one to every registered converter in priority order. The
//! first converter that accepts and succeeds wins; failures are recorded and
//! the search moves on.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (path / stream / bytes)
//!  │
//!  ├─ 1. Input     resolve a local path (URLs are the caller's job)
//!  ├─ 2. Detect    hints + peeked bytes → de-duplicated hypotheses
//!  ├─ 3. Dispatch  hypotheses × converters, lowest priority first
//!  │     ├─ zip    expand members, dispatch each through the same registry
//!  │     ├─ docx   OMML math → $LaTeX$, then render paragraphs
//!  │     ├─ html   fast_html2md, <title> as result title
//!  │     ├─ csv    pipe table
//!  │     └─ text   generic catch-all (declared or detected charset)
//!  └─ 4. Polish    whitespace normalisation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2md::{DocumentEngine, EngineConfig, StreamInfo};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = DocumentEngine::new(EngineConfig::default())?;
//!
//!     let result = engine.convert("thesis.docx")?;
//!     println!("{}", result.markdown);
//!
//!     let bytes = std::fs::read("notes")?;
//!     let hint = StreamInfo::new().with_extension(".txt");
//!     let result = engine.convert_bytes(&bytes, Some(hint))?;
//!     println!("{}", result.markdown);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-doc2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod converters;
pub mod error;
pub mod math;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod stream_info;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConvertOptions, EngineConfig, EngineConfigBuilder, TextDecoding};
pub use convert::DocumentEngine;
pub use converters::docx::DocxRenderer;
pub use converters::{
    DocumentConverter, PRIORITY_GENERIC_FILE_FORMAT, PRIORITY_SPECIFIC_FILE_FORMAT,
};
pub use error::{ConverterError, Doc2MdError, FailedAttempt};
pub use math::omml_to_latex;
pub use output::ConversionResult;
pub use pipeline::detect::{DetectionHints, MagicClassifier, SignatureClassifier, TransportMetadata};
pub use pipeline::dispatch::DispatchContext;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::ReadSeek;
pub use stream_info::StreamInfo;
