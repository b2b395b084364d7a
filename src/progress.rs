//! Progress-callback trait for dispatch events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::EngineConfigBuilder::progress_callback`] to observe
//! which hypotheses were tried, which converters accepted, and which of them
//! failed, without turning on debug logging.
//!
//! Nested dispatches (container members) report through the same callback,
//! with `depth` > 0.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2md::{ConversionProgressCallback, EngineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failures: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for FailureCounter {
//!     fn on_attempt_failed(&self, converter: &str, hypothesis: &str, error: &str, _depth: usize) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{converter} rejected {hypothesis}: {error}");
//!     }
//! }
//!
//! let config = EngineConfig::builder()
//!     .progress_callback(Arc::new(FailureCounter { failures: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the dispatch loop as it works through hypotheses and converters.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Engines may run on several threads at once
/// (see [`crate::DocumentEngine::convert_async`]); protect shared state with
/// `Mutex` or atomics.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once per dispatch, before any converter is asked.
    fn on_dispatch_start(&self, hypotheses: usize, depth: usize) {
        let _ = (hypotheses, depth);
    }

    /// Called when a converter accepted a hypothesis and is about to convert.
    fn on_attempt_start(&self, converter: &str, hypothesis: &str, depth: usize) {
        let _ = (converter, hypothesis, depth);
    }

    /// Called when an accepting converter failed; dispatch continues.
    fn on_attempt_failed(&self, converter: &str, hypothesis: &str, error: &str, depth: usize) {
        let _ = (converter, hypothesis, error, depth);
    }

    /// Called when a converter produced the result.
    ///
    /// # Arguments
    /// * `markdown_len` — byte length of the normalised Markdown
    fn on_dispatch_complete(&self, converter: &str, markdown_len: usize, depth: usize) {
        let _ = (converter, markdown_len, depth);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::EngineConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
