//! Configuration types for document-to-Markdown conversion.
//!
//! Engine-level behaviour is controlled through [`EngineConfig`], built via
//! its [`EngineConfigBuilder`]. The per-call knobs that converters read are
//! grouped in [`ConvertOptions`], which the engine hands to every `accepts`
//! and `convert` call through the dispatch context.

use crate::converters::docx::DocxRenderer;
use crate::error::Doc2MdError;
use crate::pipeline::detect::SignatureClassifier;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Smallest accepted peek window; enough for every built-in signature.
pub const MIN_PEEK_BYTES: usize = 16;
/// Largest accepted peek window.
pub const MAX_PEEK_BYTES: usize = 1024 * 1024;

/// Configuration for a [`crate::DocumentEngine`].
///
/// # Example
/// ```rust
/// use edgequake_doc2md::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .peek_bytes(8192)
///     .cleanup_extracted(false)
///     .build()
///     .unwrap();
/// assert!(!config.options.cleanup_extracted);
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    /// Register the built-in converters (zip, docx, plain text). Default: true.
    pub enable_builtins: bool,

    /// Number of leading bytes handed to the signature classifier. Default: 4096.
    pub peek_bytes: usize,

    /// Options forwarded to every converter.
    pub options: ConvertOptions,

    /// Replacement signature classifier. If None, uses the built-in magic-byte table.
    pub classifier: Option<Arc<dyn SignatureClassifier>>,

    /// Renderer used by the built-in DOCX converter. If None, uses the
    /// built-in paragraph renderer.
    pub docx_renderer: Option<Arc<dyn DocxRenderer>>,

    /// Optional dispatch event callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_builtins: true,
            peek_bytes: 4096,
            options: ConvertOptions::default(),
            classifier: None,
            docx_renderer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("enable_builtins", &self.enable_builtins)
            .field("peek_bytes", &self.peek_bytes)
            .field("options", &self.options)
            .field(
                "classifier",
                &self.classifier.as_ref().map(|_| "<dyn SignatureClassifier>"),
            )
            .field(
                "docx_renderer",
                &self.docx_renderer.as_ref().map(|_| "<dyn DocxRenderer>"),
            )
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn enable_builtins(mut self, v: bool) -> Self {
        self.config.enable_builtins = v;
        self
    }

    pub fn peek_bytes(mut self, n: usize) -> Self {
        self.config.peek_bytes = n.clamp(MIN_PEEK_BYTES, MAX_PEEK_BYTES);
        self
    }

    pub fn keep_data_uris(mut self, v: bool) -> Self {
        self.config.options.keep_data_uris = v;
        self
    }

    pub fn cleanup_extracted(mut self, v: bool) -> Self {
        self.config.options.cleanup_extracted = v;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.options.scratch_dir = Some(dir.into());
        self
    }

    pub fn style_map(mut self, map: impl Into<String>) -> Self {
        self.config.options.style_map = Some(map.into());
        self
    }

    pub fn text_decoding(mut self, mode: TextDecoding) -> Self {
        self.config.options.text_decoding = mode;
        self
    }

    pub fn max_member_bytes(mut self, n: u64) -> Self {
        self.config.options.max_member_bytes = n;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn SignatureClassifier>) -> Self {
        self.config.classifier = Some(classifier);
        self
    }

    pub fn docx_renderer(mut self, renderer: Arc<dyn DocxRenderer>) -> Self {
        self.config.docx_renderer = Some(renderer);
        self
    }

    /// Attach a dispatch event callback.
    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, Doc2MdError> {
        let c = &self.config;
        if !(MIN_PEEK_BYTES..=MAX_PEEK_BYTES).contains(&c.peek_bytes) {
            return Err(Doc2MdError::InvalidConfig(format!(
                "peek_bytes must be {MIN_PEEK_BYTES}–{MAX_PEEK_BYTES}, got {}",
                c.peek_bytes
            )));
        }
        if c.options.max_member_bytes == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "max_member_bytes must be ≥ 1".into(),
            ));
        }
        if let Some(ref dir) = c.options.scratch_dir {
            if !dir.is_dir() {
                return Err(Doc2MdError::InvalidConfig(format!(
                    "scratch_dir '{}' is not an existing directory",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

/// Options visible to converters during `accepts` and `convert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Keep `data:` URIs (inline images) in the Markdown instead of truncating them. Default: false.
    pub keep_data_uris: bool,

    /// Delete files extracted from containers once conversion ends. Default: true.
    ///
    /// When false, the working directory survives the call and its path is
    /// logged at INFO level, which is handy when debugging a member that
    /// fails to convert.
    pub cleanup_extracted: bool,

    /// Parent directory for container working areas. If None, uses the system temp dir.
    pub scratch_dir: Option<PathBuf>,

    /// Style map forwarded to DOCX renderers that support one.
    pub style_map: Option<String>,

    /// How text converters treat bytes that are not valid in the declared charset.
    pub text_decoding: TextDecoding,

    /// Container members larger than this (uncompressed) are skipped. Default: 256 MiB.
    pub max_member_bytes: u64,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            keep_data_uris: false,
            cleanup_extracted: true,
            scratch_dir: None,
            style_map: None,
            text_decoding: TextDecoding::default(),
            max_member_bytes: 256 * 1024 * 1024,
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Decoding policy for textual input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextDecoding {
    /// Replace undecodable bytes with U+FFFD. (default)
    #[default]
    Lossy,
    /// Fail the attempt on undecodable bytes so another converter can try.
    Strict,
}
