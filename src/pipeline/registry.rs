//! Converter registry: (converter, priority) pairs in dispatch order.
//!
//! Ordering rule: lower priority first; among equal priorities the most
//! recently registered converter first, so a late registration (a plugin, a
//! test double) shadows a built-in without removing it. The order is
//! maintained on insertion, so iteration never sorts.
//!
//! The registry is append-only. Registration takes `&mut self` while dispatch
//! only borrows it shared, which keeps registration out of in-flight
//! conversions at compile time.

use crate::converters::DocumentConverter;
use std::sync::Arc;
use tracing::debug;

/// A converter together with its place in the dispatch order.
#[derive(Clone)]
pub struct Registration {
    pub converter: Arc<dyn DocumentConverter>,
    pub priority: f32,
    /// Monotonic registration counter, 0 for the first registration.
    pub sequence: u64,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("converter", &self.converter.name())
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: Vec<Registration>,
    next_sequence: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a converter. It is tried before every existing converter with
    /// the same or a higher priority value.
    pub fn register(&mut self, converter: Arc<dyn DocumentConverter>, priority: f32) {
        let at = self
            .entries
            .partition_point(|r| r.priority.total_cmp(&priority).is_lt());
        debug!(
            "Registering converter '{}' at priority {} (position {})",
            converter.name(),
            priority,
            at
        );
        self.entries.insert(
            at,
            Registration {
                converter,
                priority,
                sequence: self.next_sequence,
            },
        );
        self.next_sequence += 1;
    }

    /// Registrations in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, priority)` pairs in dispatch order, for listings.
    pub fn describe(&self) -> Vec<(String, f32)> {
        self.entries
            .iter()
            .map(|r| (r.converter.name().to_string(), r.priority))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConverterError;
    use crate::output::ConversionResult;
    use crate::pipeline::dispatch::DispatchContext;
    use crate::stream::ReadSeek;
    use crate::stream_info::StreamInfo;

    struct Named(&'static str);

    impl DocumentConverter for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn accepts(&self, _: &mut dyn ReadSeek, _: &StreamInfo, _: &DispatchContext<'_>) -> bool {
            false
        }
        fn convert(
            &self,
            _: &mut dyn ReadSeek,
            _: &StreamInfo,
            _: &DispatchContext<'_>,
        ) -> Result<ConversionResult, ConverterError> {
            Err(ConverterError::Other("unused".into()))
        }
    }

    fn order(r: &Registry) -> Vec<String> {
        r.describe().into_iter().map(|(n, _)| n).collect()
    }

    #[test]
    fn lower_priority_first() {
        let mut r = Registry::new();
        r.register(Arc::new(Named("generic")), 10.0);
        r.register(Arc::new(Named("specific")), 0.0);
        assert_eq!(order(&r), vec!["specific", "generic"]);
    }

    #[test]
    fn equal_priority_latest_first() {
        let mut r = Registry::new();
        r.register(Arc::new(Named("a")), 0.0);
        r.register(Arc::new(Named("b")), 0.0);
        r.register(Arc::new(Named("generic")), 10.0);
        r.register(Arc::new(Named("c")), 0.0);
        assert_eq!(order(&r), vec!["c", "b", "a", "generic"]);
    }

    #[test]
    fn fractional_priorities_interleave() {
        let mut r = Registry::new();
        r.register(Arc::new(Named("ten")), 10.0);
        r.register(Arc::new(Named("zero")), 0.0);
        r.register(Arc::new(Named("half")), 0.5);
        r.register(Arc::new(Named("neg")), -1.0);
        assert_eq!(order(&r), vec!["neg", "zero", "half", "ten"]);
    }

    #[test]
    fn sequence_counts_registrations() {
        let mut r = Registry::new();
        r.register(Arc::new(Named("a")), 5.0);
        r.register(Arc::new(Named("b")), 1.0);
        let seqs: Vec<u64> = r.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 0]);
        assert_eq!(r.len(), 2);
        assert!(!r.is_empty());
    }
}
