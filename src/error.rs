//! Error types for the edgequake-doc2md library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`Doc2MdError`] — **Fatal**: the call cannot produce a result (input
//!   missing, no converter accepted the stream, every accepting converter
//!   failed). Returned as `Err(Doc2MdError)` from the `convert*` entry points.
//!
//! * [`ConverterError`] — **Per attempt**: one converter accepted a
//!   hypothesis and then failed. The dispatch loop catches it, records it in
//!   a [`FailedAttempt`] and moves on; it only reaches the caller inside
//!   [`Doc2MdError::ConversionFailed`].
//!
//! * [`MathError`] — **Local**: a math sub-tree could not be parsed or is
//!   missing a required part. The transducer degrades it to plain text and
//!   never lets it escape the document being converted.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doc2md library.
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not something the engine can open.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// Reading the input failed after it was opened.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Dispatch errors ───────────────────────────────────────────────────
    /// No registered converter accepted any of the detected hypotheses.
    #[error(
        "Unsupported format: no converter accepted the input.\nHypotheses tried: [{}]",
        .hypotheses.join(", ")
    )]
    UnsupportedFormat { hypotheses: Vec<String> },

    /// At least one converter accepted the input but every one of them failed.
    #[error(
        "Conversion failed: {} converter attempt(s) failed.\n{}",
        .attempts.len(),
        format_attempts(.attempts)
    )]
    ConversionFailed { attempts: Vec<FailedAttempt> },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2MdError {
    /// The recorded attempts when this is a [`Doc2MdError::ConversionFailed`].
    pub fn attempts(&self) -> &[FailedAttempt] {
        match self {
            Doc2MdError::ConversionFailed { attempts } => attempts,
            _ => &[],
        }
    }
}

fn format_attempts(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("  - {a}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A non-fatal error raised by a single converter.
///
/// Captured by the dispatch loop; the overall conversion continues with the
/// next converter or hypothesis.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Reading the stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes do not form a valid document of the claimed format.
    #[error("malformed {format} input: {detail}")]
    Malformed { format: String, detail: String },

    /// A converter needs a collaborator that is not available.
    #[error("converter '{converter}' requires {dependency}, which is not available")]
    MissingDependency {
        converter: String,
        dependency: String,
    },

    /// Any other converter-specific failure.
    #[error("{0}")]
    Other(String),
}

impl From<zip::result::ZipError> for ConverterError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => ConverterError::Io(io),
            other => ConverterError::Malformed {
                format: "zip".to_string(),
                detail: other.to_string(),
            },
        }
    }
}

impl From<quick_xml::Error> for ConverterError {
    fn from(e: quick_xml::Error) -> Self {
        ConverterError::Malformed {
            format: "xml".to_string(),
            detail: e.to_string(),
        }
    }
}

/// One accepting converter that failed, in attempt order.
#[derive(Debug, Serialize)]
pub struct FailedAttempt {
    /// Name reported by [`crate::converters::DocumentConverter::name`].
    pub converter: String,
    /// Label of the hypothesis the converter accepted.
    pub hypothesis: String,
    /// The captured failure.
    #[serde(serialize_with = "serialize_display")]
    pub error: ConverterError,
}

impl std::fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.converter, self.hypothesis, self.error)
    }
}

fn serialize_display<S: serde::Serializer>(
    e: &ConverterError,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.collect_str(e)
}

/// A math sub-tree that could not be transformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    /// The XML itself could not be read.
    #[error("malformed OMML: {0}")]
    Xml(String),

    /// A structural element lacks a child it cannot be rendered without.
    #[error("<m:{tag}> is missing required <m:{child}>")]
    MissingChild { tag: String, child: String },
}

impl From<quick_xml::Error> for MathError {
    fn from(e: quick_xml::Error) -> Self {
        MathError::Xml(e.to_string())
    }
}

impl From<std::io::Error> for MathError {
    fn from(e: std::io::Error) -> Self {
        MathError::Xml(e.to_string())
    }
}
