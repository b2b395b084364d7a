//! Detection cascade: turn hints and leading bytes into ordered hypotheses.
//!
//! ## Tiers
//!
//! ```text
//! 1. explicit hint        caller said "this is .csv"
//! 2. name-derived ext     file name / URL path / Content-Disposition
//! 3. declared type        MIME type from the caller or a transport header
//! 4. signature guesses    leading bytes → SignatureClassifier (retry without
//!                         leading whitespace when nothing matched)
//! 5. sentinel             no extension, no type: content-gated converters
//! ```
//!
//! Earlier tiers are cheaper and more trustworthy, so they come first. The
//! result is de-duplicated on the (extension, mimetype) pair, keeping the
//! first occurrence.

use crate::stream::peek_bytes;
use crate::stream_info::{normalise_extension, normalise_mimetype, StreamInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Read, Seek};
use std::sync::Arc;
use tracing::{debug, warn};

// ── Classifier contract ──────────────────────────────────────────────────────

/// Guesses formats from a bounded byte prefix.
///
/// Implementations return zero or more guesses, most confident first. Only
/// `extension`, `mimetype` and `charset` of the returned values are used.
pub trait SignatureClassifier: Send + Sync {
    fn classify(&self, head: &[u8]) -> Vec<StreamInfo>;
}

/// Built-in classifier backed by a table of well-known magic numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicClassifier;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const OLE2_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";
/// Local file header, empty archive, spanned archive.
const ZIP_SIGNATURES: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

impl SignatureClassifier for MagicClassifier {
    fn classify(&self, head: &[u8]) -> Vec<StreamInfo> {
        let guess = |ext: &str, mime: &str| StreamInfo::new().with_extension(ext).with_mimetype(mime);

        if head.starts_with(b"%PDF-") {
            return vec![guess(".pdf", "application/pdf")];
        }
        if ZIP_SIGNATURES.iter().any(|sig| head.starts_with(sig)) {
            let mut guesses = Vec::with_capacity(2);
            if let Some(office) = classify_zip_package(head) {
                guesses.push(office);
            }
            guesses.push(guess(".zip", "application/zip"));
            return guesses;
        }
        if head.starts_with(b"\x89PNG\r\n\x1a\n") {
            return vec![guess(".png", "image/png")];
        }
        if head.starts_with(b"\xFF\xD8\xFF") {
            return vec![guess(".jpg", "image/jpeg")];
        }
        if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
            return vec![guess(".gif", "image/gif")];
        }
        if head.starts_with(b"{\\rtf") {
            return vec![guess(".rtf", "application/rtf")];
        }
        if head.starts_with(OLE2_MAGIC) {
            return vec![StreamInfo::new().with_mimetype("application/x-ole-storage")];
        }

        let (body, had_bom) = match head.strip_prefix(UTF8_BOM) {
            Some(rest) => (rest, true),
            None => (head, false),
        };
        let mut guesses = classify_markup(body);
        if had_bom {
            if guesses.is_empty() {
                guesses.push(guess(".txt", "text/plain"));
            }
            guesses = guesses.into_iter().map(|g| g.with_charset("utf-8")).collect();
        }
        guesses
    }
}

/// Office/EPUB packages are zip files whose member names show up in the first local headers.
fn classify_zip_package(head: &[u8]) -> Option<StreamInfo> {
    let contains = |needle: &[u8]| head.windows(needle.len()).any(|w| w == needle);
    let (ext, mime) = if contains(b"mimetypeapplication/epub+zip") {
        (".epub", "application/epub+zip")
    } else if contains(b"word/") {
        (".docx", DOCX_MIME)
    } else if contains(b"xl/") {
        (".xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
    } else if contains(b"ppt/") {
        (".pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation")
    } else {
        return None;
    };
    Some(StreamInfo::new().with_extension(ext).with_mimetype(mime))
}

static RE_HTML: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:<!--.*?-->\s*)*<(?:!doctype\s+html|html|head|body)\b").unwrap());
static RE_XML_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<\?xml\s").unwrap());
static RE_SVG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<svg\b").unwrap());
static RE_JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^(?:\{\s*"|\[\s*[\{\["\d-])"#).unwrap());

fn classify_markup(body: &[u8]) -> Vec<StreamInfo> {
    let text = String::from_utf8_lossy(&body[..body.len().min(1024)]);
    let guess = |ext: &str, mime: &str| StreamInfo::new().with_extension(ext).with_mimetype(mime);

    if RE_HTML.is_match(&text) {
        return vec![guess(".html", "text/html")];
    }
    if RE_XML_DECL.is_match(&text) {
        if RE_SVG.is_match(&text) {
            return vec![guess(".svg", "image/svg+xml"), guess(".xml", "application/xml")];
        }
        if RE_HTML.is_match(text.split_once("?>").map(|(_, r)| r.trim_start()).unwrap_or("")) {
            return vec![guess(".html", "text/html"), guess(".xml", "application/xml")];
        }
        return vec![guess(".xml", "application/xml")];
    }
    if RE_JSON_OBJECT.is_match(&text) {
        return vec![guess(".json", "application/json")];
    }
    Vec::new()
}

// ── MIME ↔ extension tables ──────────────────────────────────────────────────

pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

static MIME_TABLE: &[(&str, &str)] = &[
    ("application/pdf", ".pdf"),
    ("application/zip", ".zip"),
    ("application/x-zip-compressed", ".zip"),
    (DOCX_MIME, ".docx"),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", ".xlsx"),
    ("application/vnd.openxmlformats-officedocument.presentationml.presentation", ".pptx"),
    ("application/vnd.ms-excel", ".xls"),
    ("application/msword", ".doc"),
    ("application/vnd.ms-outlook", ".msg"),
    ("application/epub+zip", ".epub"),
    ("application/rtf", ".rtf"),
    ("application/json", ".json"),
    ("application/x-ipynb+json", ".ipynb"),
    ("application/xml", ".xml"),
    ("application/rss+xml", ".rss"),
    ("application/atom+xml", ".atom"),
    ("text/xml", ".xml"),
    ("text/html", ".html"),
    ("application/xhtml+xml", ".xhtml"),
    ("text/plain", ".txt"),
    ("text/markdown", ".md"),
    ("text/csv", ".csv"),
    ("image/png", ".png"),
    ("image/jpeg", ".jpg"),
    ("image/gif", ".gif"),
    ("image/svg+xml", ".svg"),
    ("audio/mpeg", ".mp3"),
    ("audio/wav", ".wav"),
    ("audio/x-wav", ".wav"),
];

/// Canonical extension for a MIME type, if known.
pub fn extension_for_mimetype(mimetype: &str) -> Option<&'static str> {
    let essence = normalise_mimetype(mimetype)?;
    MIME_TABLE
        .iter()
        .find(|(m, _)| *m == essence)
        .map(|(_, e)| *e)
}

/// Canonical MIME type for an extension, if known.
pub fn mimetype_for_extension(extension: &str) -> Option<&'static str> {
    let ext = normalise_extension(extension)?;
    let ext = match ext.as_str() {
        ".htm" => ".html",
        ".jpeg" => ".jpg",
        ".markdown" => ".md",
        other => other,
    };
    MIME_TABLE
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(m, _)| *m)
}

// ── Name and transport hints ─────────────────────────────────────────────────

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://") || input.starts_with("file://")
}

/// The last path segment of a file path or URL, without query or fragment.
pub fn file_name_of(name: &str) -> Option<String> {
    let path = if is_url(name) {
        let no_scheme = name.split_once("://").map(|(_, rest)| rest).unwrap_or(name);
        let end = no_scheme.find(['?', '#']).unwrap_or(no_scheme.len());
        let no_query = &no_scheme[..end];
        // drop the authority
        match no_query.split_once('/') {
            Some((_, path)) => path,
            None => "",
        }
    } else {
        name
    };
    path.rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extension of the last path segment, normalised.
pub fn extension_of(name: &str) -> Option<String> {
    let file = file_name_of(name)?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    normalise_extension(ext)
}

static RE_DISPOSITION_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'[^']*')?(?:"([^"]+)"|([^;\s]+))"#).unwrap()
});
static RE_CHARSET_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i);\s*charset\s*=\s*"?([^";\s]+)"?"#).unwrap());

/// Metadata an external fetcher observed alongside the bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMetadata {
    /// `Content-Type` header value, parameters included.
    pub content_type: Option<String>,
    /// `Content-Disposition` header value.
    pub content_disposition: Option<String>,
    /// Final URL after redirects.
    pub url: Option<String>,
}

impl TransportMetadata {
    /// File name from `Content-Disposition`, falling back to the URL path.
    pub fn filename(&self) -> Option<String> {
        self.content_disposition
            .as_deref()
            .and_then(|cd| RE_DISPOSITION_FILENAME.captures(cd))
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| self.url.as_deref().and_then(file_name_of))
    }

    /// `charset=` parameter of the content type.
    pub fn charset(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| RE_CHARSET_PARAM.captures(ct))
            .map(|c| c[1].to_ascii_lowercase())
    }

    /// Convert into cascade hints.
    pub fn into_hints(self) -> DetectionHints {
        let mut explicit = StreamInfo::new();
        if let Some(ref url) = self.url {
            explicit = explicit.with_url(url.clone());
        }
        if let Some(charset) = self.charset() {
            explicit = explicit.with_charset(charset);
        }
        DetectionHints {
            explicit: Some(explicit),
            name: self.filename(),
            declared_type: self.content_type,
        }
    }
}

/// Everything the caller knows about a stream before sniffing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionHints {
    /// Explicit caller intent; its extension/type form the first hypothesis
    /// and its origin fields (url, local path, charset) seed every hypothesis.
    pub explicit: Option<StreamInfo>,
    /// File name, path or URL the stream came from.
    pub name: Option<String>,
    /// Declared MIME type, parameters allowed.
    pub declared_type: Option<String>,
}

impl DetectionHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn explicit(mut self, info: StreamInfo) -> Self {
        self.explicit = Some(info);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn declared_type(mut self, mimetype: impl Into<String>) -> Self {
        self.declared_type = Some(mimetype.into());
        self
    }

    /// Origin fields shared by every hypothesis.
    fn base(&self) -> StreamInfo {
        let mut base = StreamInfo::new();
        if let Some(ref name) = self.name {
            if let Some(file) = file_name_of(name) {
                base = base.with_filename(file);
            }
            if is_url(name) {
                base = base.with_url(name.clone());
            }
        }
        if let Some(charset) = self
            .declared_type
            .as_deref()
            .and_then(|ct| RE_CHARSET_PARAM.captures(ct))
            .map(|c| c[1].to_ascii_lowercase())
        {
            base = base.with_charset(charset);
        }
        if let Some(ref explicit) = self.explicit {
            base = base.copy_and_update(&explicit.unconstrained());
        }
        base
    }
}

// ── Cascade ──────────────────────────────────────────────────────────────────

/// Ordered, de-duplicated hypothesis generation.
#[derive(Clone)]
pub struct DetectionCascade {
    classifier: Arc<dyn SignatureClassifier>,
    peek_bytes: usize,
}

impl std::fmt::Debug for DetectionCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionCascade")
            .field("peek_bytes", &self.peek_bytes)
            .finish_non_exhaustive()
    }
}

impl Default for DetectionCascade {
    fn default() -> Self {
        Self::new(Arc::new(MagicClassifier), 4096)
    }
}

impl DetectionCascade {
    pub fn new(classifier: Arc<dyn SignatureClassifier>, peek_bytes: usize) -> Self {
        Self {
            classifier,
            peek_bytes,
        }
    }

    /// Produce the hypotheses for `stream`, most trustworthy first.
    ///
    /// The stream position is unchanged on return. A stream that cannot be
    /// peeked simply contributes no signature guesses.
    pub fn guess<R: Read + Seek + ?Sized>(
        &self,
        hints: &DetectionHints,
        stream: &mut R,
    ) -> Vec<StreamInfo> {
        let base = hints.base();
        let mut hypotheses: Vec<StreamInfo> = Vec::new();

        // ── Tier 1: explicit hint ────────────────────────────────────────
        if let Some(ref explicit) = hints.explicit {
            if !explicit.is_unconstrained() {
                hypotheses.push(base.copy_and_update(explicit));
            }
        }

        // ── Tier 2: name-derived extension ───────────────────────────────
        if let Some(ext) = hints.name.as_deref().and_then(extension_of) {
            hypotheses.push(base.copy_and_update(&StreamInfo::new().with_extension(ext)));
        }

        // ── Tier 3: declared type ────────────────────────────────────────
        if let Some(mime) = hints.declared_type.as_deref().and_then(normalise_mimetype) {
            let mut declared = StreamInfo::new().with_mimetype(&mime);
            if let Some(ext) = extension_for_mimetype(&mime) {
                declared = declared.with_extension(ext);
            }
            hypotheses.push(base.copy_and_update(&declared));
        }

        // ── Tier 4: signature classifier ─────────────────────────────────
        match peek_bytes(stream, self.peek_bytes) {
            Ok(head) => {
                for g in self.classify_with_retry(&head) {
                    let g = StreamInfo {
                        filename: None,
                        url: None,
                        local_path: None,
                        ..g
                    };
                    hypotheses.push(base.copy_and_update(&g));
                }
            }
            Err(e) => warn!("Could not peek stream for signature detection: {}", e),
        }

        // ── Tier 5: sentinel ─────────────────────────────────────────────
        hypotheses.push(base.unconstrained());

        let hypotheses = dedup_hypotheses(hypotheses);
        debug!(
            "Hypotheses: [{}]",
            hypotheses.iter().map(|h| h.label()).collect::<Vec<_>>().join(", ")
        );
        hypotheses
    }

    fn classify_with_retry(&self, head: &[u8]) -> Vec<StreamInfo> {
        let guesses = self.classifier.classify(head);
        if !guesses.is_empty() {
            return guesses;
        }
        let start = head
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(head.len());
        if start == 0 || start == head.len() {
            return guesses;
        }
        debug!("No signature match; retrying without {} leading whitespace bytes", start);
        self.classifier.classify(&head[start..])
    }
}

/// Keep the first hypothesis for each (extension, mimetype) pair.
pub fn dedup_hypotheses(hypotheses: Vec<StreamInfo>) -> Vec<StreamInfo> {
    let mut out: Vec<StreamInfo> = Vec::with_capacity(hypotheses.len());
    for h in hypotheses {
        if !out.iter().any(|seen| seen.format_key() == h.format_key()) {
            out.push(h);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn labels(h: &[StreamInfo]) -> Vec<String> {
        h.iter().map(|i| i.label()).collect()
    }

    #[test]
    fn explicit_then_name_then_declared_then_sniffed_then_sentinel() {
        let hints = DetectionHints::new()
            .explicit(StreamInfo::new().with_extension(".md"))
            .name("notes.txt")
            .declared_type("text/csv; charset=latin-1");
        let mut stream = Cursor::new(b"%PDF-1.7\n".to_vec());
        let h = DetectionCascade::default().guess(&hints, &mut stream);
        assert_eq!(
            labels(&h),
            vec![".md", ".txt", ".csv (text/csv)", ".pdf (application/pdf)", "<any>"]
        );
        assert!(h.iter().all(|i| i.filename.as_deref() == Some("notes.txt")));
        assert!(h.iter().all(|i| i.charset.as_deref() == Some("latin-1")));
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn duplicate_pairs_are_dropped() {
        let hints = DetectionHints::new()
            .explicit(StreamInfo::new().with_extension("txt"))
            .name("a.TXT");
        let h = DetectionCascade::default().guess(&hints, &mut Cursor::new(Vec::new()));
        assert_eq!(labels(&h), vec![".txt", "<any>"]);
    }

    #[test]
    fn unknown_extension_and_no_signature() {
        let hints = DetectionHints::new().name("file.xyz");
        let mut stream = Cursor::new(vec![0u8, 1, 2, 3, 0xfe]);
        let h = DetectionCascade::default().guess(&hints, &mut stream);
        assert_eq!(labels(&h), vec![".xyz", "<any>"]);
    }

    #[test]
    fn leading_whitespace_retry() {
        let mut stream = Cursor::new(b"\n\n   <!DOCTYPE html><html></html>".to_vec());
        let h = DetectionCascade::default().guess(&DetectionHints::new(), &mut stream);
        assert_eq!(labels(&h), vec![".html (text/html)", "<any>"]);
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn position_restored_mid_stream() {
        let mut stream = Cursor::new(b"xxxx%PDF-1.4".to_vec());
        stream.set_position(4);
        let h = DetectionCascade::default().guess(&DetectionHints::new(), &mut stream);
        assert_eq!(h[0].extension.as_deref(), Some(".pdf"));
        assert_eq!(stream.position(), 4);
    }

    #[test]
    fn zip_package_refinement() {
        let mut head = b"PK\x03\x04".to_vec();
        head.extend_from_slice(&[0u8; 26]);
        head.extend_from_slice(b"word/document.xml");
        let g = MagicClassifier.classify(&head);
        assert_eq!(g[0].extension.as_deref(), Some(".docx"));
        assert_eq!(g[1].extension.as_deref(), Some(".zip"));
    }

    #[test]
    fn every_zip_signature_is_recognised() {
        for sig in [&b"PK\x03\x04"[..], b"PK\x05\x06", b"PK\x07\x08"] {
            let mut head = sig.to_vec();
            head.extend_from_slice(&[0u8; 18]);
            let g = MagicClassifier.classify(&head);
            assert_eq!(labels(&g), vec![".zip (application/zip)"], "signature {sig:?}");
        }
        let h = DetectionCascade::default()
            .guess(&DetectionHints::new(), &mut Cursor::new(b"PK\x05\x06\0\0\0\0".to_vec()));
        assert_eq!(labels(&h), vec![".zip (application/zip)", "<any>"]);
    }

    #[test]
    fn bom_marks_text() {
        let g = MagicClassifier.classify(b"\xEF\xBB\xBFhello");
        assert_eq!(g.len(), 1);
        assert_eq!(g[0].mimetype.as_deref(), Some("text/plain"));
        assert_eq!(g[0].charset.as_deref(), Some("utf-8"));
    }

    #[test]
    fn json_and_xml() {
        assert_eq!(
            MagicClassifier.classify(br#"{"a": 1}"#)[0].extension.as_deref(),
            Some(".json")
        );
        assert_eq!(
            MagicClassifier.classify(b"<?xml version=\"1.0\"?><root/>")[0]
                .extension
                .as_deref(),
            Some(".xml")
        );
        assert!(MagicClassifier.classify(b"plain words").is_empty());
    }

    #[test]
    fn custom_classifier_is_used() {
        struct Always;
        impl SignatureClassifier for Always {
            fn classify(&self, _head: &[u8]) -> Vec<StreamInfo> {
                vec![
                    StreamInfo::new().with_extension(".a"),
                    StreamInfo::new().with_extension(".b"),
                ]
            }
        }
        let cascade = DetectionCascade::new(Arc::new(Always), 64);
        let h = cascade.guess(&DetectionHints::new(), &mut Cursor::new(b"x".to_vec()));
        assert_eq!(labels(&h), vec![".a", ".b", "<any>"]);
    }

    #[test]
    fn url_names() {
        assert_eq!(
            file_name_of("https://example.com/files/report.PDF?dl=1#p2").as_deref(),
            Some("report.PDF")
        );
        assert_eq!(extension_of("https://example.com/files/report.PDF?dl=1").as_deref(), Some(".pdf"));
        assert_eq!(file_name_of("https://example.com"), None);
        assert_eq!(extension_of("/tmp/archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(".bashrc"), None);
    }

    #[test]
    fn url_name_sets_url_and_filename() {
        let hints = DetectionHints::new().name("https://example.com/a/b.txt");
        let h = DetectionCascade::default().guess(&hints, &mut Cursor::new(Vec::new()));
        assert_eq!(h[0].url.as_deref(), Some("https://example.com/a/b.txt"));
        assert_eq!(h[0].filename.as_deref(), Some("b.txt"));
    }

    #[test]
    fn transport_metadata() {
        let meta = TransportMetadata {
            content_type: Some("text/plain; charset=ISO-8859-1".into()),
            content_disposition: Some(r#"attachment; filename="data.csv""#.into()),
            url: Some("https://example.com/download?id=3".into()),
        };
        assert_eq!(meta.filename().as_deref(), Some("data.csv"));
        assert_eq!(meta.charset().as_deref(), Some("iso-8859-1"));

        let hints = meta.into_hints();
        let h = DetectionCascade::default().guess(&hints, &mut Cursor::new(Vec::new()));
        assert_eq!(labels(&h), vec![".csv", ".txt (text/plain)", "<any>"]);
        assert_eq!(h[0].url.as_deref(), Some("https://example.com/download?id=3"));
        assert_eq!(h[0].charset.as_deref(), Some("iso-8859-1"));
    }

    #[test]
    fn mime_tables() {
        assert_eq!(extension_for_mimetype("Application/PDF"), Some(".pdf"));
        assert_eq!(extension_for_mimetype("application/x-unknown"), None);
        assert_eq!(mimetype_for_extension("HTM"), Some("text/html"));
        assert_eq!(mimetype_for_extension(".docx"), Some(DOCX_MIME));
    }
}
