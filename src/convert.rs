//! The conversion engine: a converter registry plus the entry points that
//! feed it.
//!
//! A [`DocumentEngine`] owns the registry and the detection cascade. Every
//! `convert*` method reduces its input to a `Read + Seek` stream and a set of
//! [`DetectionHints`], then hands both to one dispatch. The engine is
//! immutable once built apart from registration, which takes `&mut self`, so
//! a shared `Arc<DocumentEngine>` can convert on many threads at once.

use crate::config::{ConvertOptions, EngineConfig};
use crate::converters::csv::CsvConverter;
use crate::converters::docx::DocxConverter;
use crate::converters::html::HtmlConverter;
use crate::converters::plain_text::PlainTextConverter;
use crate::converters::zip::ZipConverter;
use crate::converters::DocumentConverter;
use crate::error::Doc2MdError;
use crate::output::ConversionResult;
use crate::pipeline::detect::{DetectionCascade, DetectionHints, MagicClassifier, TransportMetadata};
use crate::pipeline::dispatch::DispatchContext;
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::registry::Registry;
use crate::progress::ProgressCallback;
use crate::stream_info::StreamInfo;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Converts documents to Markdown through a priority-ordered converter registry.
///
/// # Example
/// ```rust,no_run
/// use edgequake_doc2md::{DocumentEngine, EngineConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = DocumentEngine::new(EngineConfig::default())?;
/// let result = engine.convert("report.docx")?;
/// println!("{}", result.markdown);
/// # Ok(())
/// # }
/// ```
pub struct DocumentEngine {
    registry: Registry,
    cascade: DetectionCascade,
    options: ConvertOptions,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for DocumentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentEngine")
            .field("registry", &self.registry)
            .field("cascade", &self.cascade)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DocumentEngine {
    /// Build an engine from `config`.
    ///
    /// With `enable_builtins` the CSV, HTML, zip and DOCX converters are
    /// registered at the specific priority and the plain-text converter at the generic one.
    /// They go in first, so anything registered later at the same priority
    /// is tried before them.
    pub fn new(config: EngineConfig) -> Result<Self, Doc2MdError> {
        let classifier = config
            .classifier
            .unwrap_or_else(|| Arc::new(MagicClassifier));
        let mut engine = Self {
            registry: Registry::new(),
            cascade: DetectionCascade::new(classifier, config.peek_bytes),
            options: config.options,
            progress: config.progress_callback,
        };

        if config.enable_builtins {
            let docx = match config.docx_renderer {
                Some(renderer) => DocxConverter::with_renderer(renderer),
                None => DocxConverter::new(),
            };
            engine.register_converter(Arc::new(CsvConverter));
            engine.register_converter(Arc::new(HtmlConverter));
            engine.register_converter(Arc::new(ZipConverter));
            engine.register_converter(Arc::new(docx));
            engine.register_converter(Arc::new(PlainTextConverter));
        }

        info!(
            "Engine ready with {} converter(s): [{}]",
            engine.registry.len(),
            engine
                .converters()
                .iter()
                .map(|(n, p)| format!("{n}@{p}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(engine)
    }

    // ── Registration ─────────────────────────────────────────────────────

    /// Register `converter` at `priority` (lower is tried first).
    pub fn register(&mut self, converter: Arc<dyn DocumentConverter>, priority: f32) {
        self.registry.register(converter, priority);
    }

    /// Register `converter` at its own [`DocumentConverter::default_priority`].
    pub fn register_converter(&mut self, converter: Arc<dyn DocumentConverter>) {
        let priority = converter.default_priority();
        self.registry.register(converter, priority);
    }

    /// `(name, priority)` of every registered converter, in dispatch order.
    pub fn converters(&self) -> Vec<(String, f32)> {
        self.registry.describe()
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    // ── Conversion entry points ──────────────────────────────────────────

    /// Convert a local file given as a string.
    ///
    /// # Errors
    /// - [`Doc2MdError::InvalidInput`] for URLs and empty strings
    /// - [`Doc2MdError::FileNotFound`] / [`Doc2MdError::PermissionDenied`]
    /// - [`Doc2MdError::UnsupportedFormat`] when no converter accepted it
    /// - [`Doc2MdError::ConversionFailed`] when every accepting converter failed
    pub fn convert(&self, input: &str) -> Result<ConversionResult, Doc2MdError> {
        info!("Starting conversion: {}", input);
        let resolved = input::resolve_input(input)?;
        self.convert_resolved(resolved, None)
    }

    /// Convert the file at `path`.
    ///
    /// `hint` is explicit caller intent; its extension and MIME type become
    /// the first hypothesis. The path itself is recorded as `local_path` on
    /// every hypothesis.
    pub fn convert_local(
        &self,
        path: impl AsRef<Path>,
        hint: Option<StreamInfo>,
    ) -> Result<ConversionResult, Doc2MdError> {
        let path = path.as_ref();
        info!("Starting conversion: {}", path.display());
        let resolved = input::resolve_local(path)?;
        self.convert_resolved(resolved, hint)
    }

    /// Convert an open stream from its current position.
    ///
    /// The stream is read in place; its position is restored before return.
    pub fn convert_stream<R: Read + Seek>(
        &self,
        stream: &mut R,
        hint: Option<StreamInfo>,
    ) -> Result<ConversionResult, Doc2MdError> {
        let mut hints = DetectionHints::new();
        if let Some(name) = hint
            .as_ref()
            .and_then(|h| h.filename.clone().or_else(|| h.url.clone()))
        {
            hints = hints.name(name);
        }
        if let Some(hint) = hint {
            hints = hints.explicit(hint);
        }
        self.run(stream, &hints)
    }

    /// Convert an in-memory buffer.
    pub fn convert_bytes(
        &self,
        bytes: &[u8],
        hint: Option<StreamInfo>,
    ) -> Result<ConversionResult, Doc2MdError> {
        debug!("Converting {} in-memory bytes", bytes.len());
        self.convert_stream(&mut Cursor::new(bytes), hint)
    }

    /// Convert a stream fetched by the caller, using the transport headers
    /// it observed (`Content-Type`, `Content-Disposition`, final URL).
    pub fn convert_with_metadata<R: Read + Seek>(
        &self,
        stream: &mut R,
        metadata: TransportMetadata,
    ) -> Result<ConversionResult, Doc2MdError> {
        if let Some(ref url) = metadata.url {
            info!("Starting conversion: {}", url);
        }
        self.run(stream, &metadata.into_hints())
    }

    /// Convert `input` and write the Markdown to `output`.
    ///
    /// The file is written to a temporary sibling first and renamed into
    /// place, so `output` never holds a partial document.
    pub fn convert_to_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<ConversionResult, Doc2MdError> {
        let result = self.convert_local(input, None)?;
        write_atomic(output.as_ref(), &result.markdown)?;
        info!("Wrote {}", output.as_ref().display());
        Ok(result)
    }

    /// Run [`Self::convert_local`] on tokio's blocking pool.
    ///
    /// Conversions are CPU- and I/O-bound, so they never run on the async
    /// executor threads. Concurrent calls share the registry read-only.
    pub async fn convert_async(
        self: Arc<Self>,
        path: impl Into<PathBuf>,
        hint: Option<StreamInfo>,
    ) -> Result<ConversionResult, Doc2MdError> {
        let path = path.into();
        tokio::task::spawn_blocking(move || self.convert_local(&path, hint))
            .await
            .map_err(|e| Doc2MdError::Internal(format!("conversion task panicked: {e}")))?
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn convert_resolved(
        &self,
        resolved: ResolvedInput,
        hint: Option<StreamInfo>,
    ) -> Result<ConversionResult, Doc2MdError> {
        let ResolvedInput { path, mut file } = resolved;
        let explicit = hint.unwrap_or_default().with_local_path(&path);
        let hints = DetectionHints::new()
            .name(path.to_string_lossy())
            .explicit(explicit);
        self.run(&mut file, &hints)
    }

    fn run<R: Read + Seek>(
        &self,
        stream: &mut R,
        hints: &DetectionHints,
    ) -> Result<ConversionResult, Doc2MdError> {
        let start = Instant::now();

        // ── Step 1: Detect ───────────────────────────────────────────────
        let ctx = DispatchContext::new(
            &self.registry,
            &self.cascade,
            &self.options,
            self.progress.as_ref(),
        );
        let hypotheses = ctx.guess(hints, stream);
        debug!("{} hypothesis(es) to try", hypotheses.len());

        // ── Step 2: Dispatch ─────────────────────────────────────────────
        let result = ctx.dispatch(stream, &hypotheses)?;

        info!(
            "Conversion complete in {}ms: {} bytes of Markdown",
            start.elapsed().as_millis(),
            result.markdown.len()
        );
        Ok(result)
    }
}

/// Write `contents` to `path` through a temporary file in the same directory.
///
/// Missing parent directories are created. On failure `path` is untouched.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), Doc2MdError> {
    let write_err = |source: std::io::Error| Doc2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".doc2md-")
        .suffix(".md.tmp")
        .tempfile_in(&parent)
        .map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DocumentEngine {
        DocumentEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn builtins_registered_in_dispatch_order() {
        let names: Vec<String> = engine().converters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["docx", "zip", "html", "csv", "plain_text"]);
    }

    #[test]
    fn builtins_can_be_disabled() {
        let config = EngineConfig::builder().enable_builtins(false).build().unwrap();
        assert!(DocumentEngine::new(config).unwrap().converters().is_empty());
    }

    #[test]
    fn bytes_with_extension_hint() {
        let result = engine()
            .convert_bytes(b"hello", Some(StreamInfo::new().with_extension("txt")))
            .unwrap();
        assert_eq!(result.markdown, "hello");
        assert_eq!(result.converter.as_deref(), Some("plain_text"));
    }

    #[test]
    fn html_and_csv_are_converted_not_passed_through() {
        let html = "<!DOCTYPE html><html><body><h1>Title</h1><p>Hello <b>x</b></p></body></html>";
        let result = engine()
            .convert_bytes(html.as_bytes(), Some(StreamInfo::new().with_filename("page.html")))
            .unwrap();
        assert_eq!(result.converter.as_deref(), Some("html"));
        assert!(!result.markdown.contains('<'), "got: {}", result.markdown);
        assert!(result.markdown.contains("Title"));

        let result = engine()
            .convert_bytes(b"a,b\n1,2\n", Some(StreamInfo::new().with_mimetype("text/csv")))
            .unwrap();
        assert_eq!(result.converter.as_deref(), Some("csv"));
        assert_eq!(result.markdown, "| a | b |\n| --- | --- |\n| 1 | 2 |");
    }

    #[test]
    fn declared_cp1252_text_decodes_smart_quotes() {
        let hint = StreamInfo::new().with_extension(".txt").with_charset("windows-1252");
        let result = engine().convert_bytes(b"it\x92s", Some(hint)).unwrap();
        assert_eq!(result.markdown, "it\u{2019}s");
    }

    #[test]
    fn url_input_rejected() {
        let err = engine().convert("https://example.com/a.docx").unwrap_err();
        assert!(matches!(err, Doc2MdError::InvalidInput { .. }));
    }

    #[test]
    fn missing_file_reported() {
        let err = engine().convert_local("/no/such/file.txt", None).unwrap_err();
        assert!(matches!(err, Doc2MdError::FileNotFound { .. }));
    }

    #[test]
    fn metadata_drives_detection() {
        let metadata = TransportMetadata {
            content_type: Some("text/plain; charset=utf-8".into()),
            content_disposition: Some(r#"attachment; filename="notes""#.into()),
            url: Some("https://example.com/download?id=7".into()),
        };
        let mut stream = Cursor::new(b"from the wire".to_vec());
        let result = engine().convert_with_metadata(&mut stream, metadata).unwrap();
        assert_eq!(result.markdown, "from the wire");
    }

    #[test]
    fn async_conversion_runs_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.md");
        std::fs::write(&path, "# Hi").unwrap();
        let engine = Arc::new(engine());
        let result = tokio_test::block_on(engine.convert_async(path, None)).unwrap();
        assert_eq!(result.markdown, "# Hi");
    }

    #[test]
    fn atomic_write_creates_parent_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out.md");
        write_atomic(&out, "# Title").unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "# Title");
        let leftovers: Vec<_> = std::fs::read_dir(out.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
