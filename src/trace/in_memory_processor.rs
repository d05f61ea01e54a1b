//! A [`SpanProcessor`] that collects finished spans in memory, for use in
//! tests and assertions.

use crate::trace::{Span, SpanData, SpanProcessor};
use crate::{Context, TraceError, TraceResult};
use std::sync::{Arc, Mutex};

/// A [`SpanProcessor`] that stores every finished span in memory.
///
/// Cloning is shallow; all clones observe the same collected spans, so a
/// clone can be registered with a tracer while the original is kept for
/// assertions.
///
/// # Example
///
/// ```
/// use worker_tracer::trace::{InMemorySpanProcessor, Tracer};
///
/// let processor = InMemorySpanProcessor::default();
/// let tracer = Tracer::builder()
///     .with_span_processor(processor.clone())
///     .build();
///
/// let mut span = tracer.start_span("operation");
/// span.end();
///
/// let finished = processor.spans();
/// assert_eq!(finished.len(), 1);
/// assert_eq!(finished[0].name, "operation");
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanProcessor {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemorySpanProcessor {
    /// Returns a copy of the finished spans collected so far, in end order.
    pub fn spans(&self) -> Vec<SpanData> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    /// Clears the collected spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanProcessor for InMemorySpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // Only finished spans are collected.
    }

    fn on_end(&self, span: SpanData) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span);
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> TraceResult<()> {
        self.spans
            .lock()
            .map(|mut spans| spans.clear())
            .map_err(|_| TraceError::from("in-memory span store poisoned"))
    }
}
