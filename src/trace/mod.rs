//! The tracing API: spans, samplers, id generation, and the tracer that ties
//! them together.
//!
//! A *trace* records the paths taken by requests as they propagate through
//! the instrumented application. A trace is a tree of [`Span`]s, each
//! describing one operation, identified by a [`SpanContext`] that can be
//! serialized and propagated across process boundaries.
//!
//! ## Creating spans
//!
//! Spans are created through a [`Tracer`]. The simplest form infers the
//! parent from the current [`Context`]:
//!
//! ```
//! use worker_tracer::trace::Tracer;
//!
//! let tracer = Tracer::builder().build();
//!
//! tracer.start_active_span("process_job", |span| {
//!     // children started here join the "process_job" trace
//!     span.end();
//! });
//! ```
//!
//! For more control use a [`SpanBuilder`], which can set the kind, initial
//! attributes, links, an explicit start time, or force the span to start a
//! new trace.
//!
//! ## Sampling
//!
//! Every span creation consults a [`ShouldSample`] implementation, installed
//! process-wide via [`crate::config`]. The built-in [`Sampler`]s cover the
//! common policies; the default respects the parent's decision and samples
//! all roots.
//!
//! ## Observing spans
//!
//! [`SpanProcessor`]s registered on the tracer are notified when spans start
//! and end. Every ended span is handed over as immutable [`SpanData`];
//! spans the sampler dropped produce a record with no attributes or events.
//!
//! [`Context`]: crate::Context

mod id_generator;
#[cfg(any(feature = "testing", test))]
mod in_memory_processor;
mod sampler;
mod span;
mod span_context;
mod span_processor;
mod tracer;

pub use id_generator::{IdGenerator, RandomIdGenerator};
#[cfg(any(feature = "testing", test))]
pub use id_generator::IncrementIdGenerator;
#[cfg(any(feature = "testing", test))]
pub use in_memory_processor::InMemorySpanProcessor;
pub use sampler::{CloneShouldSample, Sampler, SamplingDecision, SamplingResult, ShouldSample};
pub use span::{Event, Link, Span, SpanData, SpanKind, Status};
pub use span_context::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
pub use span_processor::SpanProcessor;
pub use tracer::{SpanBuilder, Tracer, TracerBuilder};
