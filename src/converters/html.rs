//! HTML to Markdown through `fast_html2md`.
//!
//! Scripts and style sheets are dropped before conversion; the document
//! `<title>` becomes the result title.

use crate::converters::plain_text::decode;
use crate::converters::{DocumentConverter, PRIORITY_SPECIFIC_FILE_FORMAT};
use crate::error::ConverterError;
use crate::output::ConversionResult;
use crate::pipeline::dispatch::DispatchContext;
use crate::stream::ReadSeek;
use crate::stream_info::StreamInfo;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use tracing::{info, warn};

const ACCEPTED_MIME_TYPE_PREFIXES: &[&str] = &["text/html", "application/xhtml"];
const ACCEPTED_FILE_EXTENSIONS: &[&str] = &[".html", ".htm", ".xhtml"];

static RE_SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>").unwrap()
});
static RE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlConverter;

impl HtmlConverter {
    pub const NAME: &'static str = "html";
}

impl DocumentConverter for HtmlConverter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_priority(&self) -> f32 {
        PRIORITY_SPECIFIC_FILE_FORMAT
    }

    fn accepts(&self, _stream: &mut dyn ReadSeek, info: &StreamInfo, _ctx: &DispatchContext<'_>) -> bool {
        info.has_extension(ACCEPTED_FILE_EXTENSIONS)
            || info.mimetype_starts_with(ACCEPTED_MIME_TYPE_PREFIXES)
    }

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        info: &StreamInfo,
        ctx: &DispatchContext<'_>,
    ) -> Result<ConversionResult, ConverterError> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        let source = decode(&bytes, info.charset.as_deref(), ctx.options().text_decoding)?;
        let title = extract_title(&source);
        let markdown = html_to_markdown(&source);
        if markdown.trim().is_empty() {
            warn!("HTML conversion produced empty output");
        } else {
            info!("HTML converted to markdown ({} bytes)", markdown.len());
        }

        let result = ConversionResult::new(markdown);
        Ok(match title {
            Some(title) => result.with_title(title),
            None => result,
        })
    }
}

/// Convert an HTML document or fragment to Markdown.
pub fn html_to_markdown(source: &str) -> String {
    let cleaned = RE_SCRIPT_STYLE.replace_all(source, "");
    html2md::rewrite_html(&cleaned, false).trim().to_string()
}

fn extract_title(source: &str) -> Option<String> {
    let raw = RE_TITLE.captures(source)?.get(1)?.as_str();
    let title = RE_WS.replace_all(&unescape_entities(raw), " ").trim().to_string();
    (!title.is_empty()).then_some(title)
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
