//! Generic text converter: passes textual content through as Markdown.
//!
//! Registered at [`PRIORITY_GENERIC_FILE_FORMAT`] so every format-specific
//! converter gets the first chance. Besides declared text types it also
//! accepts the unconstrained hypothesis when the leading bytes look like
//! text, which is what lets extension-less text streams convert at all.

use crate::config::TextDecoding;
use crate::converters::{DocumentConverter, PRIORITY_GENERIC_FILE_FORMAT};
use crate::error::ConverterError;
use crate::output::ConversionResult;
use crate::pipeline::dispatch::DispatchContext;
use crate::stream::{peek_bytes, ReadSeek};
use crate::stream_info::StreamInfo;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use std::io::Read;
use tracing::{debug, warn};

const ACCEPTED_MIME_TYPE_PREFIXES: &[&str] = &[
    "text/",
    "application/json",
    "application/x-ndjson",
    "application/markdown",
];

const ACCEPTED_FILE_EXTENSIONS: &[&str] = &[
    ".txt", ".text", ".md", ".markdown", ".json", ".jsonl", ".log", ".rst",
];

/// Bytes inspected when deciding whether unlabelled content is text.
const SNIFF_BYTES: usize = 4096;

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextConverter;

impl PlainTextConverter {
    pub const NAME: &'static str = "plain_text";
}

impl DocumentConverter for PlainTextConverter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_priority(&self) -> f32 {
        PRIORITY_GENERIC_FILE_FORMAT
    }

    fn accepts(&self, stream: &mut dyn ReadSeek, info: &StreamInfo, _ctx: &DispatchContext<'_>) -> bool {
        if info.has_extension(ACCEPTED_FILE_EXTENSIONS)
            || info.mimetype_starts_with(ACCEPTED_MIME_TYPE_PREFIXES)
        {
            return true;
        }
        if !info.is_unconstrained() {
            return false;
        }
        // Only the sentinel hypothesis is content-gated.
        match peek_bytes(stream, SNIFF_BYTES) {
            Ok(head) => looks_like_text(&head),
            Err(_) => false,
        }
    }

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        info: &StreamInfo,
        ctx: &DispatchContext<'_>,
    ) -> Result<ConversionResult, ConverterError> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        let text = decode(&bytes, info.charset.as_deref(), ctx.options().text_decoding)?;
        debug!("plain_text: decoded {} bytes into {} chars", bytes.len(), text.chars().count());
        Ok(ConversionResult::new(text))
    }
}

/// No NUL bytes and valid UTF-8, allowing a sequence cut off at the window edge.
pub fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && e.valid_up_to() + 4 > head.len(),
    }
}

/// Decode `bytes` according to `charset`.
///
/// A declared charset is resolved through the WHATWG label table. Without
/// one, a byte-order mark wins, then valid UTF-8, then a statistical guess
/// over the legacy single- and multi-byte encodings.
pub fn decode(bytes: &[u8], charset: Option<&str>, mode: TextDecoding) -> Result<String, ConverterError> {
    let encoding = match charset {
        Some(label) => match encoding_for_label(label) {
            Some(encoding) => encoding,
            None if mode == TextDecoding::Strict => {
                return Err(ConverterError::Other(format!("unsupported charset '{label}'")));
            }
            None => {
                warn!("plain_text: unknown charset '{label}', guessing from content");
                sniff_encoding(bytes)
            }
        },
        None => sniff_encoding(bytes),
    };

    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors && mode == TextDecoding::Strict {
        return Err(ConverterError::Malformed {
            format: format!("{} text", used.name().to_ascii_lowercase()),
            detail: "byte sequence not valid in this encoding".to_string(),
        });
    }
    Ok(text.into_owned())
}

/// Resolve a charset label, accepting the common non-WHATWG spellings.
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().to_ascii_lowercase();
    Encoding::for_label(label.as_bytes()).or_else(|| {
        let alias = match label.as_str() {
            "latin-1" | "latin_1" => "latin1".to_string(),
            "utf_8" => "utf-8".to_string(),
            other => other.replace('_', "-"),
        };
        Encoding::for_label(alias.as_bytes())
    })
}

/// Best guess at the encoding of undeclared bytes.
pub fn sniff_encoding(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);
    debug!("plain_text: content is not UTF-8, guessed {}", guess.name());
    guess
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertOptions;
    use crate::pipeline::detect::DetectionCascade;
    use crate::pipeline::registry::Registry;
    use std::io::Cursor;

    fn with_ctx<T>(f: impl FnOnce(&DispatchContext<'_>) -> T) -> T {
        let registry = Registry::new();
        let cascade = DetectionCascade::default();
        let options = ConvertOptions::default();
        let ctx = DispatchContext::new(&registry, &cascade, &options, None);
        f(&ctx)
    }

    #[test]
    fn accepts_by_extension_and_mimetype() {
        with_ctx(|ctx| {
            let mut s = Cursor::new(vec![0u8; 4]);
            let c = PlainTextConverter;
            assert!(c.accepts(&mut s, &StreamInfo::new().with_extension(".md"), ctx));
            assert!(c.accepts(&mut s, &StreamInfo::new().with_mimetype("text/csv"), ctx));
            assert!(!c.accepts(&mut s, &StreamInfo::new().with_extension(".pdf"), ctx));
        });
    }

    #[test]
    fn sentinel_gated_on_content_and_restores_position() {
        with_ctx(|ctx| {
            let c = PlainTextConverter;
            let mut text = Cursor::new(b"just words\n".to_vec());
            assert!(c.accepts(&mut text, &StreamInfo::new(), ctx));
            assert_eq!(text.position(), 0);

            let mut binary = Cursor::new(vec![1u8, 0, 2, 3]);
            assert!(!c.accepts(&mut binary, &StreamInfo::new(), ctx));
            assert_eq!(binary.position(), 0);
        });
    }

    #[test]
    fn converts_utf8_with_bom() {
        with_ctx(|ctx| {
            let mut s = Cursor::new(b"\xEF\xBB\xBFhello".to_vec());
            let r = PlainTextConverter
                .convert(&mut s, &StreamInfo::new().with_extension(".txt"), ctx)
                .unwrap();
            assert_eq!(r.markdown, "hello");
        });
    }

    #[test]
    fn latin1_and_utf16() {
        assert_eq!(decode(b"caf\xe9", Some("ISO-8859-1"), TextDecoding::Strict).unwrap(), "café");
        assert_eq!(decode(b"caf\xe9", Some("latin-1"), TextDecoding::Strict).unwrap(), "café");
        assert_eq!(
            decode(b"\xFF\xFEh\0i\0", Some("utf-16"), TextDecoding::Strict).unwrap(),
            "hi"
        );
        assert_eq!(decode(b"\0h\0i", Some("utf-16be"), TextDecoding::Strict).unwrap(), "hi");
    }

    #[test]
    fn windows_1252_uses_its_own_table_for_0x80_to_0x9f() {
        let bytes = b"it\x92s \x93quoted\x94 \x80 5";
        let expected = "it\u{2019}s \u{201C}quoted\u{201D} \u{20AC} 5";
        assert_eq!(decode(bytes, Some("windows-1252"), TextDecoding::Strict).unwrap(), expected);
        assert_eq!(decode(bytes, Some("cp1252"), TextDecoding::Strict).unwrap(), expected);
    }

    #[test]
    fn other_legacy_charsets_decode() {
        // "привет" in KOI8-R
        let koi8 = b"\xd0\xd2\xc9\xd7\xc5\xd4";
        assert_eq!(decode(koi8, Some("koi8-r"), TextDecoding::Strict).unwrap(), "привет");
        assert_eq!(decode(b"\xa4", Some("iso_8859-15"), TextDecoding::Strict).unwrap(), "\u{20AC}");
    }

    #[test]
    fn undeclared_latin1_is_detected_not_mangled() {
        let bytes = b"Le caf\xe9 est tr\xe8s chaud et la cr\xe8me br\xfbl\xe9e est d\xe9licieuse.";
        let expected = "Le café est très chaud et la crème brûlée est délicieuse.";
        assert_eq!(decode(bytes, None, TextDecoding::Lossy).unwrap(), expected);
        assert_eq!(decode(bytes, None, TextDecoding::Strict).unwrap(), expected);
    }

    #[test]
    fn undeclared_utf8_and_bom_win_over_detection() {
        assert_eq!(sniff_encoding("héllo".as_bytes()), UTF_8);
        assert_eq!(sniff_encoding(b"\xFE\xFF\0h"), encoding_rs::UTF_16BE);
        assert_eq!(decode(b"\xFE\xFF\0h\0i", None, TextDecoding::Strict).unwrap(), "hi");
    }

    #[test]
    fn strict_rejects_invalid_bytes_and_unknown_labels() {
        assert!(decode(b"a\xc3\x28\xfd", Some("utf-8"), TextDecoding::Strict).is_err());
        assert_eq!(decode(b"a\xffb", Some("utf-8"), TextDecoding::Lossy).unwrap(), "a\u{FFFD}b");
        assert!(decode(b"x", Some("x-made-up"), TextDecoding::Strict).is_err());
        assert_eq!(decode(b"x", Some("x-made-up"), TextDecoding::Lossy).unwrap(), "x");
    }

    #[test]
    fn converter_honours_declared_and_undeclared_charsets() {
        with_ctx(|ctx| {
            let info = StreamInfo::new().with_extension(".txt").with_charset("windows-1252");
            let mut s = Cursor::new(b"\x93hi\x94".to_vec());
            let r = PlainTextConverter.convert(&mut s, &info, ctx).unwrap();
            assert_eq!(r.markdown, "\u{201C}hi\u{201D}");

            let info = StreamInfo::new().with_extension(".txt");
            let bytes = b"Le caf\xe9 est tr\xe8s chaud et la cr\xe8me br\xfbl\xe9e est d\xe9licieuse.";
            let mut s = Cursor::new(bytes.to_vec());
            let r = PlainTextConverter.convert(&mut s, &info, ctx).unwrap();
            assert_eq!(r.markdown, "Le café est très chaud et la crème brûlée est délicieuse.");
        });
    }

    #[test]
    fn truncated_multibyte_at_window_edge_is_text() {
        let mut head = b"abc".to_vec();
        head.extend_from_slice(&"é".as_bytes()[..1]);
        assert!(looks_like_text(&head));
        assert!(!looks_like_text(b"\xff\xfe\xfdabc"));
        assert!(!looks_like_text(b""));
    }
}
