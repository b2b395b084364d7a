//! Metadata describing one interpretation of a byte stream.
//!
//! A [`StreamInfo`] is never mutated after construction. The detection
//! cascade derives each hypothesis with [`StreamInfo::copy_and_update`],
//! so every converter sees a complete, self-contained description.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Candidate description of a stream: format, encoding and origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Lowercase MIME type without parameters, e.g. `text/plain`.
    pub mimetype: Option<String>,
    /// Lowercase extension including the leading dot, e.g. `.docx`.
    pub extension: Option<String>,
    /// Character set declared for textual content.
    pub charset: Option<String>,
    /// File name (no directories).
    pub filename: Option<String>,
    /// URL the stream was fetched from.
    pub url: Option<String>,
    /// Path on the local file system.
    pub local_path: Option<PathBuf>,
}

impl StreamInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, ext: impl AsRef<str>) -> Self {
        self.extension = normalise_extension(ext.as_ref());
        self
    }

    pub fn with_mimetype(mut self, mimetype: impl AsRef<str>) -> Self {
        self.mimetype = normalise_mimetype(mimetype.as_ref());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_local_path(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        self.local_path = Some(path.to_path_buf());
        if self.filename.is_none() {
            self.filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
        }
        self
    }

    /// Return a new instance where every field set in `update` overrides
    /// the corresponding field of `self`; unset fields fall through.
    pub fn copy_and_update(&self, update: &StreamInfo) -> StreamInfo {
        StreamInfo {
            mimetype: update.mimetype.clone().or_else(|| self.mimetype.clone()),
            extension: update.extension.clone().or_else(|| self.extension.clone()),
            charset: update.charset.clone().or_else(|| self.charset.clone()),
            filename: update.filename.clone().or_else(|| self.filename.clone()),
            url: update.url.clone().or_else(|| self.url.clone()),
            local_path: update.local_path.clone().or_else(|| self.local_path.clone()),
        }
    }

    /// The same origin with no format constraint: extension and type cleared.
    pub fn unconstrained(&self) -> StreamInfo {
        StreamInfo {
            mimetype: None,
            extension: None,
            ..self.clone()
        }
    }

    /// True when neither an extension nor a MIME type is known.
    pub fn is_unconstrained(&self) -> bool {
        self.extension.is_none() && self.mimetype.is_none()
    }

    /// The (extension, mimetype) pair used to de-duplicate hypotheses.
    pub fn format_key(&self) -> (Option<&str>, Option<&str>) {
        (self.extension.as_deref(), self.mimetype.as_deref())
    }

    /// Case-insensitive check of the extension against a list like `[".txt", ".md"]`.
    pub fn has_extension(&self, candidates: &[&str]) -> bool {
        self.extension
            .as_deref()
            .is_some_and(|ext| candidates.iter().any(|c| c.eq_ignore_ascii_case(ext)))
    }

    /// True when the MIME type starts with any of the given prefixes.
    pub fn mimetype_starts_with(&self, prefixes: &[&str]) -> bool {
        self.mimetype
            .as_deref()
            .is_some_and(|m| prefixes.iter().any(|p| m.starts_with(p)))
    }

    /// Short label for diagnostics: `.txt`, `text/plain`, `.txt (text/plain)` or `<any>`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.extension, &self.mimetype) {
            (Some(ext), Some(mime)) => write!(f, "{ext} ({mime})"),
            (Some(ext), None) => f.write_str(ext),
            (None, Some(mime)) => f.write_str(mime),
            (None, None) => f.write_str("<any>"),
        }
    }
}

/// Lowercase and ensure a leading dot; empty input yields `None`.
pub fn normalise_extension(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.');
    if ext.is_empty() {
        None
    } else {
        Some(format!(".{}", ext.to_ascii_lowercase()))
    }
}

/// Lowercase and strip parameters (`; charset=…`); empty input yields `None`.
pub fn normalise_mimetype(mimetype: &str) -> Option<String> {
    let essence = mimetype.split(';').next().unwrap_or("").trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}
