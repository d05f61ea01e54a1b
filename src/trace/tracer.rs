use crate::config::{self, TracingConfig};
use crate::trace::span::{set_or_replace, SpanState};
use crate::trace::{
    IdGenerator, Link, RandomIdGenerator, SamplingDecision, Span, SpanContext, SpanData, SpanId,
    SpanKind, SpanProcessor, Status, TraceFlags,
};
use crate::{Context, KeyValue, Resource, TraceError, TraceResult};
use std::borrow::Cow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::SystemTime;

/// Creates [`Span`]s and hands them to the registered [`SpanProcessor`]s.
///
/// A `Tracer` owns the span processors, the [`Resource`] describing the
/// entity producing the spans, and the [`IdGenerator`] used for new trace and
/// span ids. It is cheap to clone; clones share all of these.
///
/// The sampling policy is *not* owned by the tracer. It is looked up from the
/// process-wide [`config`] at every span start, unless a configuration was
/// pinned with [`TracerBuilder::with_config`].
///
/// # Example
///
/// ```
/// use worker_tracer::trace::Tracer;
///
/// let tracer = Tracer::builder().build();
///
/// tracer.start_active_span("handle_request", |span| {
///     // "fetch_user" becomes a child of "handle_request"
///     let mut child = tracer.start_span("fetch_user");
///     child.end();
///     span.end();
/// });
/// ```
#[derive(Clone, Debug)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

#[derive(Debug)]
struct TracerInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    resource: Resource,
    id_generator: Box<dyn IdGenerator>,
    config: Option<Arc<TracingConfig>>,
}

impl Default for Tracer {
    fn default() -> Self {
        Tracer::builder().build()
    }
}

impl Tracer {
    /// Returns a builder for configuring a new `Tracer`.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// Starts a new [`Span`] as a child of the span active in the current
    /// context, or as a root span if none is active.
    pub fn start_span<T>(&self, name: T) -> Span
    where
        T: Into<Cow<'static, str>>,
    {
        Context::map_current(|cx| self.start_span_with_context(name, cx))
    }

    /// Starts a new [`Span`] with the given context as the parent scope.
    pub fn start_span_with_context<T>(&self, name: T, parent_cx: &Context) -> Span
    where
        T: Into<Cow<'static, str>>,
    {
        self.build_with_context(SpanBuilder::from_name(name), parent_cx)
    }

    /// Starts a new [`Span`] from a [`SpanBuilder`], using the current
    /// context as the parent scope.
    pub fn build(&self, builder: SpanBuilder) -> Span {
        Context::map_current(|cx| self.build_with_context(builder, cx))
    }

    /// Starts a new [`Span`] from a [`SpanBuilder`] with the given context as
    /// the parent scope.
    ///
    /// This consults the head sampler, assembles the new span's
    /// [`SpanContext`], and notifies every registered processor's `on_start`.
    /// Processors are notified for every span, including spans the sampler
    /// decided to drop.
    pub fn build_with_context(&self, mut builder: SpanBuilder, parent_cx: &Context) -> Span {
        let parent_cx = if builder.root {
            Cow::Owned(parent_cx.without_span())
        } else {
            Cow::Borrowed(parent_cx)
        };
        let parent_span_context = parent_cx.span_context().filter(|sc| sc.is_valid());

        // Spans stay within the parent trace when one exists
        let trace_id = match parent_span_context {
            Some(sc) => sc.trace_id(),
            None => self.inner.id_generator.new_trace_id(),
        };
        let span_id = self.inner.id_generator.new_span_id();

        let span_kind = builder.span_kind.take().unwrap_or(SpanKind::Internal);
        let mut attributes = Vec::new();
        for attribute in builder.attributes.take().unwrap_or_default() {
            if attribute.key.as_str().is_empty() {
                crate::tracer_warn!(
                    name: "span.attribute_key_empty",
                    message = "attribute with an empty key discarded"
                );
                continue;
            }
            set_or_replace(&mut attributes, attribute);
        }
        let links = builder.links.take().unwrap_or_default();

        let config = match &self.inner.config {
            Some(config) => config.clone(),
            None => config::active(),
        };
        let sampling = config.head_sampler().should_sample(
            Some(parent_cx.as_ref()),
            trace_id,
            &builder.name,
            &span_kind,
            &attributes,
            &links,
        );

        // The sampled flag reflects this span's decision alone; other parent
        // flag bits are not inherited
        let trace_flags = if sampling.decision == SamplingDecision::RecordAndSample {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::NOT_SAMPLED
        };
        let span_context = SpanContext::new(
            trace_id,
            span_id,
            trace_flags,
            false,
            sampling.trace_state,
        );

        let recording = sampling.decision != SamplingDecision::Drop;
        if recording {
            for attribute in sampling.attributes {
                set_or_replace(&mut attributes, attribute);
            }
        }
        let start_time = builder.start_time.unwrap_or_else(SystemTime::now);
        // Dropped spans still end up at the processors, with a bare record
        let state = SpanState {
            parent_span_id: parent_span_context
                .map(|sc| sc.span_id())
                .unwrap_or(SpanId::INVALID),
            span_kind,
            name: builder.name,
            start_time,
            end_time: start_time,
            attributes: if recording { attributes } else { Vec::new() },
            events: Vec::new(),
            links: if recording { links } else { Vec::new() },
            status: Status::Unset,
        };

        let mut span = Span::new(span_context, state, recording, self.clone());
        for processor in &self.inner.processors {
            let result = catch_unwind(AssertUnwindSafe(|| {
                processor.on_start(&mut span, parent_cx.as_ref())
            }));
            if result.is_err() {
                crate::tracer_warn!(
                    name: "span_processor.on_start_panic",
                    message = "a span processor panicked in on_start and was isolated"
                );
            }
        }
        span
    }

    /// Starts a new [`Span`] and marks it active in the current context for
    /// the duration of the given closure.
    ///
    /// Spans started inside the closure (on the same thread, or in futures
    /// wrapped with [`FutureExt::with_current_context`]) become children of
    /// the new span. The span is passed to the closure mutably and is *not*
    /// ended implicitly; end it inside the closure, or not at all if the work
    /// is abandoned.
    ///
    /// [`FutureExt::with_current_context`]: crate::FutureExt::with_current_context
    pub fn start_active_span<T, N, F>(&self, name: N, f: F) -> T
    where
        N: Into<Cow<'static, str>>,
        F: FnOnce(&mut Span) -> T,
    {
        self.build_active(SpanBuilder::from_name(name), f)
    }

    /// Starts a new [`Span`] from a [`SpanBuilder`] and marks it active in
    /// the current context for the duration of the given closure.
    pub fn build_active<T, F>(&self, builder: SpanBuilder, f: F) -> T
    where
        F: FnOnce(&mut Span) -> T,
    {
        let parent_cx = Context::current();
        self.build_active_with_context(builder, &parent_cx, f)
    }

    /// Starts a new [`Span`] from a [`SpanBuilder`] with an explicit parent
    /// scope and marks it active in the current context for the duration of
    /// the given closure.
    ///
    /// Use this when the parent was extracted from an incoming request rather
    /// than taken from the ambient context.
    pub fn build_active_with_context<T, F>(
        &self,
        builder: SpanBuilder,
        parent_cx: &Context,
        f: F,
    ) -> T
    where
        F: FnOnce(&mut Span) -> T,
    {
        let mut span = self.build_with_context(builder, parent_cx);
        let cx = parent_cx.with_span_context(span.span_context().clone());
        let _guard = cx.attach();
        f(&mut span)
    }

    /// Merges the given attributes into this tracer's [`Resource`].
    ///
    /// The change is last-write-wins per key and visible through every handle
    /// to the resource, including spans already handed to processors.
    pub fn add_to_resource(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        self.inner.resource.merge(attributes);
    }

    /// Returns a handle to this tracer's [`Resource`].
    pub fn resource(&self) -> Resource {
        self.inner.resource.clone()
    }

    /// Asks every registered processor to flush, in registration order.
    pub fn force_flush(&self) -> Vec<TraceResult<()>> {
        self.inner
            .processors
            .iter()
            .map(|processor| processor.force_flush())
            .collect()
    }

    /// Shuts down every registered processor, in registration order.
    ///
    /// All processors are shut down even if an earlier one fails; the first
    /// error is returned.
    pub fn shutdown(&self) -> TraceResult<()> {
        let mut result = Ok(());
        for processor in &self.inner.processors {
            if let Err(err) = processor.shutdown() {
                if result.is_ok() {
                    result = Err(TraceError::from(err.to_string()));
                }
            }
        }
        result
    }

    /// Hands a finished span to every registered processor, in registration
    /// order. A panicking processor is isolated so the remaining processors
    /// still observe the span.
    pub(crate) fn export(&self, data: SpanData) {
        for processor in &self.inner.processors {
            let result = catch_unwind(AssertUnwindSafe(|| processor.on_end(data.clone())));
            if result.is_err() {
                crate::tracer_warn!(
                    name: "span_processor.on_end_panic",
                    message = "a span processor panicked in on_end and was isolated"
                );
            }
        }
    }
}

/// A builder for [`Tracer`]s.
#[derive(Debug, Default)]
pub struct TracerBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    resource: Option<Resource>,
    id_generator: Option<Box<dyn IdGenerator>>,
    config: Option<Arc<TracingConfig>>,
}

impl TracerBuilder {
    /// Register a [`SpanProcessor`]. Processors are notified of span starts
    /// and ends in the order they were registered.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// The [`Resource`] describing the entity producing spans.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// The [`IdGenerator`] for new trace and span ids. Defaults to
    /// [`RandomIdGenerator`].
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Box::new(id_generator));
        self
    }

    /// Pin a [`TracingConfig`] to this tracer, bypassing the process-wide
    /// configuration. Mainly useful in tests, which must not observe each
    /// other's sampling policy.
    pub fn with_config(mut self, config: TracingConfig) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    /// Build the configured [`Tracer`].
    pub fn build(self) -> Tracer {
        Tracer {
            inner: Arc::new(TracerInner {
                processors: self.processors,
                resource: self.resource.unwrap_or_default(),
                id_generator: self
                    .id_generator
                    .unwrap_or_else(|| Box::<RandomIdGenerator>::default()),
                config: self.config,
            }),
        }
    }
}

/// Entry point for starting spans with more than a name.
///
/// All fields are optional except the name; unset fields fall back to the
/// values `start_span` would use.
///
/// # Example
///
/// ```
/// use worker_tracer::trace::{SpanBuilder, SpanKind, Tracer};
/// use worker_tracer::KeyValue;
///
/// let tracer = Tracer::builder().build();
///
/// let mut span = SpanBuilder::from_name("export_batch")
///     .with_kind(SpanKind::Producer)
///     .with_attributes([KeyValue::new("batch.size", 12)])
///     .start(&tracer);
/// span.end();
/// ```
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// The operation name.
    pub name: Cow<'static, str>,
    /// The relationship between the span and its caller.
    pub span_kind: Option<SpanKind>,
    /// Attributes set at span creation, visible to the sampler.
    pub attributes: Option<Vec<KeyValue>>,
    /// Links set at span creation, visible to the sampler.
    pub links: Option<Vec<Link>>,
    /// An explicit start time, instead of now.
    pub start_time: Option<SystemTime>,
    /// Start a new trace, ignoring any active parent span.
    pub root: bool,
}

impl SpanBuilder {
    /// Create a builder for a span with the given name.
    pub fn from_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Specify the span kind.
    pub fn with_kind(self, span_kind: SpanKind) -> Self {
        SpanBuilder {
            span_kind: Some(span_kind),
            ..self
        }
    }

    /// Specify attributes known at span creation.
    pub fn with_attributes<I>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        SpanBuilder {
            attributes: Some(attributes.into_iter().collect()),
            ..self
        }
    }

    /// Specify links known at span creation.
    pub fn with_links(self, links: Vec<Link>) -> Self {
        SpanBuilder { links: Some(links), ..self }
    }

    /// Specify an explicit start time.
    pub fn with_start_time<T: Into<SystemTime>>(self, start_time: T) -> Self {
        SpanBuilder {
            start_time: Some(start_time.into()),
            ..self
        }
    }

    /// Force the span to start a new trace, even when a parent is active.
    pub fn as_root(self) -> Self {
        SpanBuilder { root: true, ..self }
    }

    /// Start the configured span through the given tracer, with the current
    /// context as the parent scope.
    pub fn start(self, tracer: &Tracer) -> Span {
        tracer.build(self)
    }

    /// Start the configured span through the given tracer, with an explicit
    /// parent scope.
    pub fn start_with_context(self, tracer: &Tracer, parent_cx: &Context) -> Span {
        tracer.build_with_context(self, parent_cx)
    }
}
