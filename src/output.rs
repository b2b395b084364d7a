//! Conversion result returned by every successful dispatch.

use serde::{Deserialize, Serialize};

/// The Markdown produced for one input, plus an optional document title.
///
/// Exactly one `ConversionResult` (or one fatal error) is produced per
/// top-level `convert*` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Normalised Markdown text.
    pub markdown: String,

    /// Document title, when the converter could determine one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Name of the converter that produced the result. Filled in by the
    /// dispatch loop; converters leave it empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converter: Option<String>,
}

impl ConversionResult {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            title: None,
            converter: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Alias kept for callers that think of the output as plain text.
    pub fn text_content(&self) -> &str {
        &self.markdown
    }
}

impl std::fmt::Display for ConversionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.markdown)
    }
}
