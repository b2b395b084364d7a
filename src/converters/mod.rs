//! The converter contract and the built-in converters.
//!
//! A converter is anything implementing [`DocumentConverter`]. The engine
//! stores converters as `Arc<dyn DocumentConverter>` in its registry and
//! never needs to know their concrete types, so plugins and built-ins are
//! indistinguishable to the dispatch loop.
//!
//! | Converter | Default priority | Accepts |
//! |-----------|------------------|---------|
//! | [`zip::ZipConverter`] | 0 (specific) | `.zip`, `application/zip`, `PK` signatures |
//! | [`docx::DocxConverter`] | 0 (specific) | `.docx`, the WordprocessingML MIME type |
//! | [`html::HtmlConverter`] | 0 (specific) | `.html`, `.htm`, `.xhtml`, `text/html` |
//! | [`csv::CsvConverter`] | 0 (specific) | `.csv`, `text/csv`, `application/csv` |
//! | [`plain_text::PlainTextConverter`] | 10 (generic) | `text/*`, JSON/Markdown, or text-looking content |

pub mod csv;
pub mod docx;
pub mod html;
pub mod plain_text;
pub mod zip;

use crate::error::ConverterError;
use crate::output::ConversionResult;
use crate::pipeline::dispatch::DispatchContext;
use crate::stream::ReadSeek;
use crate::stream_info::StreamInfo;

/// Priority for converters that handle one specific format. Tried first.
pub const PRIORITY_SPECIFIC_FILE_FORMAT: f32 = 0.0;

/// Priority for catch-all converters (plain text, generic HTML, …).
pub const PRIORITY_GENERIC_FILE_FORMAT: f32 = 10.0;

/// One pluggable format handler.
///
/// # Contract
///
/// * `accepts` must be cheap. It may read from the stream to sniff content,
///   but must leave the position where it found it (use
///   [`crate::stream::StreamGuard`] or [`crate::stream::peek_bytes`]).
/// * `convert` returns the Markdown on success and a [`ConverterError`] on
///   failure. The dispatch loop records the error and tries the next
///   converter; it never propagates it raw.
/// * Both receive the [`DispatchContext`], which carries the
///   [`crate::config::ConvertOptions`] and lets container converters
///   dispatch their members through the same registry.
pub trait DocumentConverter: Send + Sync {
    /// Stable identity used in attempt records, logs and exclusion lists.
    fn name(&self) -> &str;

    /// Priority used by [`crate::DocumentEngine::register_converter`].
    fn default_priority(&self) -> f32 {
        PRIORITY_SPECIFIC_FILE_FORMAT
    }

    fn accepts(&self, stream: &mut dyn ReadSeek, info: &StreamInfo, ctx: &DispatchContext<'_>)
        -> bool;

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        info: &StreamInfo,
        ctx: &DispatchContext<'_>,
    ) -> Result<ConversionResult, ConverterError>;
}

// ── Shared rendering ─────────────────────────────────────────────────────

/// Render rows as a pipe table. The first row is the header; short rows
/// are padded to the widest row. `None` when there is nothing to render.
pub(crate) fn markdown_table(rows: &[Vec<String>]) -> Option<String> {
    let width = rows.iter().map(Vec::len).max().filter(|w| *w > 0)?;
    let line = |cells: &[String]| {
        let mut padded: Vec<String> = cells.iter().map(|c| c.replace('|', "\\|")).collect();
        padded.resize(width, String::new());
        format!("| {} |", padded.join(" | "))
    };
    let mut out = vec![line(&rows[0]), format!("|{}", " --- |".repeat(width))];
    out.extend(rows[1..].iter().map(|r| line(r)));
    Some(out.join("\n"))
}
