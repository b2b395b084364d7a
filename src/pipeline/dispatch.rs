//! The dispatch loop: hypotheses × converters until one succeeds.
//!
//! ```text
//! for hypothesis in hypotheses            (cascade order)
//!   for converter in registry             (priority order, skip excluded)
//!     accepts? ── no ──▶ next, nothing recorded
//!        │ yes
//!     convert ── Err ──▶ record FailedAttempt, next
//!        │ Ok
//!     normalise ──▶ return
//! nothing accepted    ──▶ UnsupportedFormat { hypotheses }
//! all accepted failed ──▶ ConversionFailed { attempts }
//! ```
//!
//! The stream is rewound to its starting offset before every `accepts` and
//! `convert` call and once more when dispatch returns.

use crate::config::ConvertOptions;
use crate::error::{Doc2MdError, FailedAttempt};
use crate::output::ConversionResult;
use crate::pipeline::detect::{DetectionCascade, DetectionHints};
use crate::pipeline::postprocess;
use crate::pipeline::registry::Registry;
use crate::progress::ProgressCallback;
use crate::stream::{ReadSeek, StreamGuard};
use crate::stream_info::StreamInfo;
use tracing::{debug, info, warn};

/// Everything a converter may need from the engine during one dispatch.
///
/// Container converters use [`DispatchContext::excluding`] to obtain a
/// child context with themselves removed, then call
/// [`DispatchContext::convert_stream`] for each member.
#[derive(Clone)]
pub struct DispatchContext<'a> {
    registry: &'a Registry,
    cascade: &'a DetectionCascade,
    options: &'a ConvertOptions,
    progress: Option<&'a ProgressCallback>,
    excluded: Vec<String>,
    depth: usize,
}

impl<'a> DispatchContext<'a> {
    pub fn new(
        registry: &'a Registry,
        cascade: &'a DetectionCascade,
        options: &'a ConvertOptions,
        progress: Option<&'a ProgressCallback>,
    ) -> Self {
        Self {
            registry,
            cascade,
            options,
            progress,
            excluded: Vec::new(),
            depth: 0,
        }
    }

    pub fn options(&self) -> &ConvertOptions {
        self.options
    }

    /// Nesting level: 0 for the top-level call, 1 inside a container, …
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Names of converters that this dispatch will skip.
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    pub fn is_excluded(&self, converter: &str) -> bool {
        self.excluded.iter().any(|n| n == converter)
    }

    /// A child context one level deeper with `converter` excluded.
    pub fn excluding(&self, converter: &str) -> DispatchContext<'a> {
        let mut child = self.clone();
        if !child.is_excluded(converter) {
            child.excluded.push(converter.to_string());
        }
        child.depth += 1;
        child
    }

    /// Run the detection cascade for `stream`.
    pub fn guess(&self, hints: &DetectionHints, stream: &mut dyn ReadSeek) -> Vec<StreamInfo> {
        self.cascade.guess(hints, stream)
    }

    /// Detect, then dispatch.
    pub fn convert_stream(
        &self,
        stream: &mut dyn ReadSeek,
        hints: &DetectionHints,
    ) -> Result<ConversionResult, Doc2MdError> {
        let hypotheses = self.guess(hints, stream);
        self.dispatch(stream, &hypotheses)
    }

    /// Try every (hypothesis, converter) pair in order; see the module docs.
    pub fn dispatch(
        &self,
        stream: &mut dyn ReadSeek,
        hypotheses: &[StreamInfo],
    ) -> Result<ConversionResult, Doc2MdError> {
        let mut guard = StreamGuard::new(stream)
            .map_err(|e| Doc2MdError::Internal(format!("stream position unavailable: {e}")))?;
        let mut attempts: Vec<FailedAttempt> = Vec::new();

        if let Some(cb) = self.progress {
            cb.on_dispatch_start(hypotheses.len(), self.depth);
        }

        for info in hypotheses {
            let label = info.label();
            for reg in self.registry.iter() {
                let converter = &reg.converter;
                let name = converter.name();
                if self.is_excluded(name) {
                    continue;
                }

                rewind(&mut guard)?;
                let accepted = converter.accepts(&mut *guard, info, self);
                rewind(&mut guard)?;
                if !accepted {
                    continue;
                }

                debug!("Converter '{}' accepted hypothesis {} (depth {})", name, label, self.depth);
                if let Some(cb) = self.progress {
                    cb.on_attempt_start(name, &label, self.depth);
                }

                match converter.convert(&mut *guard, info, self) {
                    Ok(mut result) => {
                        result.markdown = postprocess::normalise_markdown(&result.markdown);
                        result.converter = Some(name.to_string());
                        info!(
                            "Converted as {} by '{}' ({} bytes, {} failed attempt(s) before)",
                            label,
                            name,
                            result.markdown.len(),
                            attempts.len()
                        );
                        if let Some(cb) = self.progress {
                            cb.on_dispatch_complete(name, result.markdown.len(), self.depth);
                        }
                        return Ok(result);
                    }
                    Err(error) => {
                        warn!("Converter '{}' failed on {}: {}", name, label, error);
                        if let Some(cb) = self.progress {
                            cb.on_attempt_failed(name, &label, &error.to_string(), self.depth);
                        }
                        attempts.push(FailedAttempt {
                            converter: name.to_string(),
                            hypothesis: label.clone(),
                            error,
                        });
                    }
                }
            }
        }

        if attempts.is_empty() {
            Err(Doc2MdError::UnsupportedFormat {
                hypotheses: hypotheses.iter().map(StreamInfo::label).collect(),
            })
        } else {
            Err(Doc2MdError::ConversionFailed { attempts })
        }
    }
}

fn rewind(guard: &mut StreamGuard<'_, dyn ReadSeek + '_>) -> Result<(), Doc2MdError> {
    guard
        .rewind()
        .map_err(|e| Doc2MdError::Internal(format!("failed to rewind stream: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::DocumentConverter;
    use crate::error::ConverterError;
    use std::io::{Cursor, Read, Seek, SeekFrom};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Accepts everything; either fails or returns fixed Markdown.
    struct Scripted {
        name: &'static str,
        output: Option<&'static str>,
        accepts: AtomicUsize,
        converts: AtomicUsize,
    }

    impl Scripted {
        fn ok(name: &'static str, output: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                output: Some(output),
                accepts: AtomicUsize::new(0),
                converts: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                output: None,
                accepts: AtomicUsize::new(0),
                converts: AtomicUsize::new(0),
            })
        }
    }

    impl DocumentConverter for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn accepts(&self, stream: &mut dyn ReadSeek, _: &StreamInfo, _: &DispatchContext<'_>) -> bool {
            self.accepts.fetch_add(1, Ordering::SeqCst);
            // misbehave: consume bytes without restoring
            let mut b = [0u8; 2];
            let _ = stream.read(&mut b);
            true
        }

        fn convert(
            &self,
            stream: &mut dyn ReadSeek,
            _: &StreamInfo,
            _: &DispatchContext<'_>,
        ) -> Result<ConversionResult, ConverterError> {
            self.converts.fetch_add(1, Ordering::SeqCst);
            assert_eq!(stream.stream_position().unwrap(), 0, "stream not rewound");
            match self.output {
                Some(md) => Ok(ConversionResult::new(md)),
                None => Err(ConverterError::Other(format!("{} always fails", self.name))),
            }
        }
    }

    fn run(
        registry: &Registry,
        hypotheses: &[StreamInfo],
    ) -> Result<ConversionResult, Doc2MdError> {
        let cascade = DetectionCascade::default();
        let options = ConvertOptions::default();
        let ctx = DispatchContext::new(registry, &cascade, &options, None);
        let mut stream = Cursor::new(b"content".to_vec());
        ctx.dispatch(&mut stream, hypotheses)
    }

    fn txt() -> Vec<StreamInfo> {
        vec![StreamInfo::new().with_extension(".txt"), StreamInfo::new()]
    }

    #[test]
    fn failure_is_isolated_and_recovered() {
        let x = Scripted::failing("x");
        let y = Scripted::ok("y", "OK");
        let mut r = Registry::new();
        r.register(x.clone(), 0.0);
        r.register(y.clone(), 10.0);

        let result = run(&r, &txt()).unwrap();
        assert_eq!(result.markdown, "OK");
        assert_eq!(result.converter.as_deref(), Some("y"));
        assert_eq!(x.converts.load(Ordering::SeqCst), 1);
        assert_eq!(y.converts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn short_circuits_after_success() {
        let a = Scripted::ok("a", "first");
        let b = Scripted::ok("b", "second");
        let mut r = Registry::new();
        r.register(a.clone(), 0.0);
        r.register(b.clone(), 10.0);

        assert_eq!(run(&r, &txt()).unwrap().markdown, "first");
        assert_eq!(a.accepts.load(Ordering::SeqCst), 1);
        assert_eq!(b.accepts.load(Ordering::SeqCst), 0);
        assert_eq!(b.converts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn all_failures_aggregate_in_attempt_order() {
        let mut r = Registry::new();
        r.register(Scripted::failing("late"), 10.0);
        r.register(Scripted::failing("early"), 0.0);

        let err = run(&r, &txt()).unwrap_err();
        let got: Vec<(String, String)> = err
            .attempts()
            .iter()
            .map(|a| (a.converter.clone(), a.hypothesis.clone()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("early".to_string(), ".txt".to_string()),
                ("late".to_string(), ".txt".to_string()),
                ("early".to_string(), "<any>".to_string()),
                ("late".to_string(), "<any>".to_string()),
            ]
        );
    }

    #[test]
    fn empty_registry_is_unsupported() {
        let err = run(&Registry::new(), &txt()).unwrap_err();
        match err {
            Doc2MdError::UnsupportedFormat { hypotheses } => {
                assert_eq!(hypotheses, vec![".txt", "<any>"]);
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn excluded_converter_is_skipped() {
        let a = Scripted::ok("a", "from a");
        let b = Scripted::ok("b", "from b");
        let mut r = Registry::new();
        r.register(a.clone(), 0.0);
        r.register(b.clone(), 10.0);

        let cascade = DetectionCascade::default();
        let options = ConvertOptions::default();
        let ctx = DispatchContext::new(&r, &cascade, &options, None).excluding("a");
        assert_eq!(ctx.depth(), 1);
        let mut stream = Cursor::new(b"x".to_vec());
        let result = ctx.dispatch(&mut stream, &txt()).unwrap();
        assert_eq!(result.markdown, "from b");
        assert_eq!(a.accepts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn output_is_normalised() {
        let mut r = Registry::new();
        r.register(Scripted::ok("a", "x  \n\n\n\ny\t"), 0.0);
        assert_eq!(run(&r, &txt()).unwrap().markdown, "x\n\ny");
    }

    #[test]
    fn caller_position_restored() {
        let mut r = Registry::new();
        r.register(Scripted::failing("a"), 0.0);
        let cascade = DetectionCascade::default();
        let options = ConvertOptions::default();
        let ctx = DispatchContext::new(&r, &cascade, &options, None);
        let mut stream = Cursor::new(b"0123456789".to_vec());
        stream.seek(SeekFrom::Start(0)).unwrap();
        let _ = ctx.dispatch(&mut stream, &txt());
        assert_eq!(stream.position(), 0);
    }
}
