use crate::trace::SpanContext;
use futures_core::stream::Stream;
use futures_sink::Sink;
use pin_project_lite::pin_project;
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

thread_local! {
    static CURRENT_CONTEXT: std::cell::RefCell<Context> = std::cell::RefCell::new(Context::default());
}

/// An execution-scoped carrier for the active span.
///
/// A [`Context`] propagates the identity of the span currently in scope across
/// API boundaries and between logically associated execution units, so that
/// new spans pick up their parent implicitly instead of having a context
/// object threaded through every call.
///
/// [`Context`]s are immutable; write operations return a new context carrying
/// the original values plus the change.
///
/// ## Managing the current context
///
/// A context can be associated with the caller's current execution unit on a
/// given thread via the [`attach`] method, and the previous context is
/// restored by dropping the returned [`ContextGuard`]. Attach calls can be
/// nested, and each guard restores its own predecessor, so the carrier's
/// lifetime is always tied to one logical operation rather than the whole
/// process. For async execution, wrap the future with
/// [`FutureExt::with_context`] so the context is re-attached at every poll.
///
/// [`attach`]: Context::attach()
///
/// # Examples
///
/// ```
/// use worker_tracer::{Context, trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState}};
///
/// let span_context = SpanContext::new(
///     TraceId::from(1),
///     SpanId::from(1),
///     TraceFlags::SAMPLED,
///     false,
///     TraceState::default(),
/// );
///
/// let _guard = Context::new().with_span_context(span_context.clone()).attach();
///
/// // The attached span is now the ambient parent for new spans
/// assert_eq!(Context::current().span_context(), Some(&span_context));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    span: Option<Arc<SpanContext>>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Context::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context returning its value.
    ///
    /// This avoids cloning the current context when only a read is needed.
    ///
    /// Note: This function will panic if you attempt to attach another context
    /// while the current one is still borrowed.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow()))
    }

    /// Returns a clone of the current thread's context with the given span
    /// context marked as active.
    pub fn current_with_span_context(span_context: SpanContext) -> Self {
        Context::current().with_span_context(span_context)
    }

    /// Returns a copy of this context with the given span context marked as
    /// active.
    ///
    /// This is used by the tracer when a new span is started, and by
    /// propagators that have extracted a remote parent from an incoming
    /// request (construct the [`SpanContext`] with `is_remote` set in that
    /// case).
    pub fn with_span_context(&self, span_context: SpanContext) -> Self {
        Context {
            span: Some(Arc::new(span_context)),
        }
    }

    /// Returns a copy of this context with no active span.
    ///
    /// New spans started under the returned context become roots of fresh
    /// traces.
    pub fn without_span(&self) -> Self {
        Context { span: None }
    }

    /// The span context marked active in this `Context`, if any.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span.as_deref()
    }

    /// Returns whether a span context is marked as active in this `Context`.
    pub fn has_active_span(&self) -> bool {
        self.span.is_some()
    }

    /// Replaces the current context on this thread with this context.
    ///
    /// Dropping the returned [`ContextGuard`] will reset the current context
    /// to the previous value.
    ///
    /// # Examples
    ///
    /// ```
    /// use worker_tracer::{Context, trace::SpanContext};
    ///
    /// let my_cx = Context::new().with_span_context(SpanContext::NONE);
    ///
    /// // Set the current thread context
    /// let cx_guard = my_cx.attach();
    /// assert!(Context::current().has_active_span());
    ///
    /// // Drop the guard to restore the previous context
    /// drop(cx_guard);
    /// assert!(!Context::current().has_active_span());
    /// ```
    pub fn attach(self) -> ContextGuard {
        let previous_cx = CURRENT_CONTEXT
            .try_with(|current| current.replace(self))
            .ok();

        ContextGuard {
            previous_cx,
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field(
                "span",
                &self.span.as_deref().map(|sc| format!("{:?}", sc)),
            )
            .finish()
    }
}

/// A guard that resets the current context to the prior context when dropped.
#[allow(missing_debug_implementations)]
pub struct ContextGuard {
    previous_cx: Option<Context>,
    // ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous_cx) = self.previous_cx.take() {
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous_cx));
        }
    }
}

pin_project! {
    /// A future, stream, or sink that has an associated context.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        cx: Context,
    }
}

impl<T: Sized> FutureExt for T {}

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.clone().attach();

        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_next(this.inner, task_cx)
    }
}

impl<I, T: Sink<I>> Sink<I> for WithContext<T>
where
    T: Sink<I>,
{
    type Error = T::Error;

    fn poll_ready(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_ready(this.inner, task_cx)
    }

    fn start_send(self: Pin<&mut Self>, item: I) -> Result<(), Self::Error> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::start_send(this.inner, item)
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_flush(this.inner, task_cx)
    }

    fn poll_close(
        self: Pin<&mut Self>,
        task_cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let _enter = this.cx.clone().attach();
        T::poll_close(this.inner, task_cx)
    }
}

/// Extension trait allowing futures, streams, and sinks to carry the active
/// span across suspension points.
pub trait FutureExt: Sized {
    /// Attaches the provided [`Context`] to this type, returning a
    /// `WithContext` wrapper.
    ///
    /// When the wrapped type is a future, stream, or sink, the attached
    /// context will be set as current while it is being polled, so the active
    /// span follows the asynchronous continuation rather than only its
    /// synchronous prefix.
    fn with_context(self, cx: Context) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the current [`Context`] to this type, returning a
    /// `WithContext` wrapper.
    fn with_current_context(self) -> WithContext<Self> {
        let cx = Context::current();
        self.with_context(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceFlags, TraceId, TraceState};

    fn span_context(n: u64) -> SpanContext {
        SpanContext::new(
            TraceId::from(n as u128),
            SpanId::from(n),
            TraceFlags::default(),
            false,
            TraceState::default(),
        )
    }

    #[test]
    fn nested_contexts() {
        let _outer_guard = Context::new().with_span_context(span_context(1)).attach();

        let current = Context::current();
        assert_eq!(current.span_context(), Some(&span_context(1)));

        {
            let _inner_guard = Context::current_with_span_context(span_context(2)).attach();
            let current = Context::current();
            assert_eq!(current.span_context(), Some(&span_context(2)));
        }

        // Resets to the outer span when the inner guard is dropped
        let current = Context::current();
        assert_eq!(current.span_context(), Some(&span_context(1)));
    }

    #[test]
    fn without_span_clears_the_parent() {
        let _guard = Context::new().with_span_context(span_context(7)).attach();
        let cleared = Context::current().without_span();
        assert!(!cleared.has_active_span());
        // The attached context itself is untouched
        assert!(Context::current().has_active_span());
    }

    #[test]
    fn with_context_follows_suspension_points() {
        use futures_executor::block_on;

        async fn current_trace_id() -> Option<TraceId> {
            // Yield once so the assertion runs on a resumed poll
            yield_once().await;
            Context::map_current(|cx| cx.span_context().map(|sc| sc.trace_id()))
        }

        async fn yield_once() {
            let mut yielded = false;
            std::future::poll_fn(move |cx| {
                if yielded {
                    Poll::Ready(())
                } else {
                    yielded = true;
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            })
            .await
        }

        let cx = Context::new().with_span_context(span_context(9));
        let trace_id = block_on(current_trace_id().with_context(cx));
        assert_eq!(trace_id, Some(TraceId::from(9)));

        // Without the wrapper no span is active inside the future
        let trace_id = block_on(current_trace_id());
        assert_eq!(trace_id, None);
    }
}
