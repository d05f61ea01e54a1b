//! # Span Processor
//!
//! Span processors are notified of every span a [`Tracer`] creates, when the
//! span starts and when it ends. They are the hook through which spans leave
//! the tracer: an exporter, a batcher, or a test collector all plug in here.
//!
//! Processors registered on a tracer are invoked in registration order, for
//! every span regardless of its sampling decision, so a processor can count
//! or inspect spans the sampler decided to drop. A processor that panics is
//! isolated; the remaining processors still run.
//!
//! [`Tracer`]: crate::trace::Tracer

use crate::trace::{Span, SpanData};
use crate::{Context, TraceResult};

/// Interface for observing the start and end of every span.
///
/// Implementations must be thread-safe; `on_end` in particular may be called
/// from whichever thread ends the span.
pub trait SpanProcessor: Send + Sync + std::fmt::Debug {
    /// Called when a span is started.
    ///
    /// The span is passed mutably, so a processor may enrich it with
    /// attributes before any user code runs. The context carries the parent
    /// that was in scope at start time.
    fn on_start(&self, span: &mut Span, cx: &Context);

    /// Called when a span ends. Receives the finished span's immutable
    /// record. This is called at most once per span.
    fn on_end(&self, span: SpanData);

    /// Synchronously flush any buffered spans.
    fn force_flush(&self) -> TraceResult<()>;

    /// Flush and release any resources held. Spans ending after shutdown may
    /// be discarded.
    fn shutdown(&self) -> TraceResult<()>;
}
