//! The individual unit of work in a trace.
//!
//! A [`Span`] represents a single operation within a trace. Spans can be
//! nested to form a trace tree, with each trace containing a root span that
//! typically describes the end-to-end operation and child spans describing
//! sub-operations.
//!
//! The span lifecycle is append-only: once a span has [`end`]ed, further
//! mutations are ignored. Spans are not ended implicitly on drop; a span that
//! is never ended is simply never handed to the span processors, which is the
//! desired behavior for cancelled work.
//!
//! [`end`]: Span::end()

use crate::trace::{SpanContext, SpanId, Tracer};
use crate::{KeyValue, Resource};
use std::borrow::Cow;
use std::error::Error;
use std::time::SystemTime;

/// Describes the relationship between the span and its caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// A synchronous outgoing call, such as an outgoing HTTP request or
    /// database query.
    Client,
    /// Handling of a synchronous incoming call.
    Server,
    /// Scheduling of an operation for later asynchronous processing.
    Producer,
    /// Processing of an operation previously scheduled by a producer.
    Consumer,
    /// An operation internal to the application, the default.
    Internal,
}

/// The status of a [`Span`].
///
/// Status carries no timestamp; the value last written before the span ends
/// is the one exported.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error
        description: Cow<'static, str>,
    },

    /// The operation has been validated by an application developer or
    /// operator to have completed successfully.
    Ok,
}

impl Status {
    /// Create a new error status with a given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The wall clock time when this event occurred.
    pub timestamp: SystemTime,
    /// The attributes describing this event.
    pub attributes: Vec<KeyValue>,
}

impl Event {
    /// Create a new event with a timestamp of now.
    pub fn new<T: Into<Cow<'static, str>>>(name: T, attributes: Vec<KeyValue>) -> Self {
        Event {
            name: name.into(),
            timestamp: SystemTime::now(),
            attributes,
        }
    }

    /// Create a new event with an explicit timestamp.
    pub fn with_timestamp<T: Into<Cow<'static, str>>>(
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
        }
    }
}

/// A causal reference from one span to another, possibly in a different
/// trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// The span context of the linked span.
    pub span_context: SpanContext,
    /// The attributes describing this link.
    pub attributes: Vec<KeyValue>,
}

impl Link {
    /// Create a new link to the span with the given context.
    pub fn new(span_context: SpanContext, attributes: Vec<KeyValue>) -> Self {
        Link {
            span_context,
            attributes,
        }
    }
}

/// The readable, immutable record of a finished span, as handed to
/// [`SpanProcessor::on_end`].
///
/// Spans the sampler decided to drop still produce a record, with empty
/// attributes, events, and links and an `Unset` status.
///
/// The `resource` handle is shared with the originating tracer, so resource
/// attributes merged after this span ended are still observable through it.
///
/// [`SpanProcessor::on_end`]: crate::trace::SpanProcessor::on_end
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SpanData {
    /// The span context for this span.
    pub span_context: SpanContext,
    /// The span id of this span's parent, or [`SpanId::INVALID`] for roots.
    pub parent_span_id: SpanId,
    /// The relationship between this span and its caller.
    pub span_kind: SpanKind,
    /// The operation name.
    pub name: Cow<'static, str>,
    /// The wall clock time when the operation started.
    pub start_time: SystemTime,
    /// The wall clock time when the operation ended.
    pub end_time: SystemTime,
    /// The attributes describing the operation.
    pub attributes: Vec<KeyValue>,
    /// The events that occurred during the operation.
    pub events: Vec<Event>,
    /// Causal references to other spans.
    pub links: Vec<Link>,
    /// The status of the operation.
    pub status: Status,
    /// A handle to the resource of the tracer that produced this span.
    pub resource: Resource,
}

/// The in-flight state of a span.
#[derive(Clone, Debug)]
pub(crate) struct SpanState {
    pub(crate) parent_span_id: SpanId,
    pub(crate) span_kind: SpanKind,
    pub(crate) name: Cow<'static, str>,
    pub(crate) start_time: SystemTime,
    pub(crate) end_time: SystemTime,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) events: Vec<Event>,
    pub(crate) links: Vec<Link>,
    pub(crate) status: Status,
}

/// Sets an attribute, replacing any existing attribute with the same key.
///
/// Attribute keys are unique within a span; the last write wins.
pub(crate) fn set_or_replace(attributes: &mut Vec<KeyValue>, attribute: KeyValue) {
    match attributes.iter_mut().find(|kv| kv.key == attribute.key) {
        Some(existing) => existing.value = attribute.value,
        None => attributes.push(attribute),
    }
}

/// A single operation within a trace.
///
/// Created by [`Tracer::start_span`] and friends. Holds its mutable state
/// directly, so mutations require `&mut self`; share a span across threads by
/// sharing its (cheaply cloned) [`SpanContext`] instead.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    // Taken on end, so `None` means the span has ended.
    state: Option<SpanState>,
    recording: bool,
    tracer: Tracer,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        state: SpanState,
        recording: bool,
        tracer: Tracer,
    ) -> Self {
        Span {
            span_context,
            state: Some(state),
            recording,
            tracer,
        }
    }

    /// The [`SpanContext`] identifying this span.
    ///
    /// Remains valid and cloneable after the span has ended.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns `true` if this span is recording events and attributes.
    ///
    /// A span stops recording once it has ended; a span that the sampler
    /// decided to drop never records.
    pub fn is_recording(&self) -> bool {
        self.recording && self.state.is_some()
    }

    /// Runs the given closure against the state, if still open and recording.
    fn with_state<T, F: FnOnce(&mut SpanState) -> T>(&mut self, f: F) -> Option<T> {
        if self.state.is_none() {
            crate::tracer_debug!(
                name: "span.update_after_end",
                message = "span update discarded, span has already ended"
            );
            return None;
        }
        if !self.recording {
            return None;
        }
        self.state.as_mut().map(f)
    }

    /// Set a single attribute on this span.
    ///
    /// Attribute keys are unique within a span: setting an attribute with the
    /// same key as an existing attribute replaces its value. Attributes with
    /// an empty key are discarded with a warning.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if attribute.key.as_str().is_empty() {
            crate::tracer_warn!(
                name: "span.attribute_key_empty",
                message = "attribute with an empty key discarded"
            );
            return;
        }
        self.with_state(|state| set_or_replace(&mut state.attributes, attribute));
    }

    /// Set multiple attributes on this span.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        for attribute in attributes {
            self.set_attribute(attribute);
        }
    }

    /// Record an event with a timestamp of now.
    pub fn add_event<T: Into<Cow<'static, str>>>(&mut self, name: T, attributes: Vec<KeyValue>) {
        self.add_event_with_timestamp(name, SystemTime::now(), attributes)
    }

    /// Record an event with an explicit timestamp.
    pub fn add_event_with_timestamp<T: Into<Cow<'static, str>>>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) {
        let name = name.into();
        self.with_state(move |state| {
            state
                .events
                .push(Event::with_timestamp(name, timestamp, attributes));
        });
    }

    /// Record an error as an `exception` event, following the semantic
    /// conventions for exceptions.
    ///
    /// This does not change the span status.
    pub fn record_error(&mut self, err: &dyn Error) {
        if self.is_recording() {
            let attributes = vec![KeyValue::new("exception.message", err.to_string())];
            self.add_event("exception", attributes);
        }
    }

    /// Add a causal link to another span.
    pub fn add_link(&mut self, span_context: SpanContext, attributes: Vec<KeyValue>) {
        self.with_state(move |state| {
            state.links.push(Link::new(span_context, attributes));
        });
    }

    /// Set the status of this span.
    ///
    /// Later calls replace earlier ones; the status in effect when the span
    /// ends is the one exported.
    pub fn set_status(&mut self, status: Status) {
        self.with_state(move |state| {
            state.status = status;
        });
    }

    /// Update the operation name. Overrides the name given at start.
    pub fn update_name<T: Into<Cow<'static, str>>>(&mut self, new_name: T) {
        let new_name = new_name.into();
        self.with_state(move |state| {
            state.name = new_name;
        });
    }

    /// End this span with a timestamp of now.
    ///
    /// Only the first `end` call takes effect; the span is handed to the span
    /// processors exactly once and all further mutations are discarded. Every
    /// span reaches the processors, including spans the sampler decided to
    /// drop, whose record carries no attributes or events.
    pub fn end(&mut self) {
        self.end_with_timestamp(SystemTime::now());
    }

    /// End this span with an explicit timestamp.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended_and_exported(Some(timestamp));
    }

    fn ensure_ended_and_exported(&mut self, timestamp: Option<SystemTime>) {
        match self.state.take() {
            Some(mut state) => {
                if let Some(timestamp) = timestamp {
                    state.end_time = timestamp;
                }
                self.tracer.export(build_export_data(
                    state,
                    self.span_context.clone(),
                    self.tracer.resource(),
                ));
            }
            None => {
                crate::tracer_debug!(
                    name: "span.end_after_end",
                    message = "span has already ended, duplicate end call ignored"
                );
            }
        }
    }
}

fn build_export_data(state: SpanState, span_context: SpanContext, resource: Resource) -> SpanData {
    SpanData {
        span_context,
        parent_span_id: state.parent_span_id,
        span_kind: state.span_kind,
        name: state.name,
        start_time: state.start_time,
        end_time: state.end_time,
        attributes: state.attributes,
        events: state.events,
        links: state.links,
        status: state.status,
        resource,
    }
}
