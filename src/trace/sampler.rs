use crate::trace::{Link, SpanKind, TraceId, TraceState};
use crate::{Context, KeyValue};

/// The decision produced by a [`ShouldSample`] implementation for a span that
/// is about to be created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The span records nothing and its `sampled` flag stays unset.
    Drop,
    /// The span records attributes and events, but its `sampled` flag stays
    /// unset so downstream services are not obliged to sample.
    RecordOnly,
    /// The span records and its `sampled` flag is set.
    RecordAndSample,
}

/// The full output of a sampling call.
///
/// Besides the decision itself, a sampler may attach attributes to the new
/// span (for example, which rule fired) and chooses the trace state the span
/// propagates onward.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    /// Whether the span should be recorded and/or sampled.
    pub decision: SamplingDecision,
    /// Extra attributes to merge into the span.
    pub attributes: Vec<KeyValue>,
    /// The trace state to attach to the new span's context.
    pub trace_state: TraceState,
}

/// The interface for pluggable head samplers.
///
/// A sampler is consulted once per [`Tracer::start_span`] call, before the
/// span is created, and may use any of the provided information to decide
/// whether the span should be recorded and whether the `sampled` flag should
/// be propagated to children. The tracer hard-codes no sampling policy of its
/// own.
///
/// When no valid parent context exists the sampler must still produce a
/// decision (a root-sampling decision) from the trace id and span metadata
/// alone.
///
/// [`Tracer::start_span`]: crate::trace::Tracer::start_span
pub trait ShouldSample: CloneShouldSample + Send + Sync + std::fmt::Debug {
    /// Returns the [`SamplingResult`] for a span to be created.
    #[allow(clippy::too_many_arguments)]
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult;
}

/// Supporting trait making boxed [`ShouldSample`] trait objects cloneable.
/// Implemented automatically for any `Clone` sampler; not meant to be used
/// directly.
pub trait CloneShouldSample {
    /// Clones self into a new boxed trait object.
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Built-in sampling policies.
///
/// These cover the common head-based decisions; anything more elaborate is a
/// custom [`ShouldSample`] implementation.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Sample every span.
    AlwaysOn,
    /// Sample no span.
    AlwaysOff,
    /// Follow the sampling decision of a valid parent span; consult the inner
    /// sampler only for root spans.
    ParentBased(Box<dyn ShouldSample>),
    /// Sample the given fraction of traces, computed deterministically from
    /// the trace id so every span of a trace reaches the same decision.
    /// Fractions >= 1 always sample; fractions <= 0 never do.
    TraceIdRatioBased(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        // Only a valid parent counts as a parent; a present-but-invalid
        // span context is the same as no parent at all
        let parent_span_context = parent_context
            .and_then(|cx| cx.span_context())
            .filter(|sc| sc.is_valid());

        let decision = match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::ParentBased(delegate) => match parent_span_context {
                Some(parent) if parent.is_sampled() => SamplingDecision::RecordAndSample,
                Some(_) => SamplingDecision::Drop,
                None => {
                    delegate
                        .should_sample(parent_context, trace_id, name, span_kind, attributes, links)
                        .decision
                }
            },
            Sampler::TraceIdRatioBased(fraction) => {
                sample_from_trace_id(*fraction, trace_id)
            }
        };

        SamplingResult {
            decision,
            // The built-in policies never annotate spans
            attributes: Vec::new(),
            // The parent's trace state is carried forward unchanged
            trace_state: parent_span_context
                .map(|sc| sc.trace_state().clone())
                .unwrap_or_default(),
        }
    }
}

/// Maps the low 64 bits of the trace id onto `[0, 1)` and samples when the
/// result falls below the fraction. Only the bits below the sign position are
/// used so the comparison stays exact in `u64` space.
pub(crate) fn sample_from_trace_id(fraction: f64, trace_id: TraceId) -> SamplingDecision {
    if fraction >= 1.0 {
        return SamplingDecision::RecordAndSample;
    }

    let threshold = (fraction.max(0.0) * (1u64 << 63) as f64) as u64;
    let low_bits = trace_id.to_bytes()[8..]
        .try_into()
        .map(u64::from_be_bytes)
        .unwrap_or(u64::MAX);

    if (low_bits >> 1) < threshold {
        SamplingDecision::RecordAndSample
    } else {
        SamplingDecision::Drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanContext, SpanId, TraceFlags};
    use rand::Rng;

    fn decide(sampler: &Sampler, parent: Option<&Context>, trace_id: TraceId) -> SamplingDecision {
        sampler
            .should_sample(parent, trace_id, "op", &SpanKind::Internal, &[], &[])
            .decision
    }

    fn parent(sampled: bool) -> Context {
        let flags = if sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::NOT_SAMPLED
        };
        Context::new().with_span_context(SpanContext::new(
            TraceId::from(0x1CE),
            SpanId::from(0x1D),
            flags,
            false,
            TraceState::default(),
        ))
    }

    #[test]
    fn fixed_policies_ignore_everything() {
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let trace_id = TraceId::from(rng.gen::<u128>());
            assert_eq!(
                decide(&Sampler::AlwaysOn, Some(&parent(false)), trace_id),
                SamplingDecision::RecordAndSample
            );
            assert_eq!(
                decide(&Sampler::AlwaysOff, Some(&parent(true)), trace_id),
                SamplingDecision::Drop
            );
        }
    }

    #[test]
    fn ratio_bounds_clamp() {
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let trace_id = TraceId::from(rng.gen::<u128>());
            assert_eq!(
                sample_from_trace_id(1.5, trace_id),
                SamplingDecision::RecordAndSample
            );
            assert_eq!(sample_from_trace_id(-0.5, trace_id), SamplingDecision::Drop);
        }
    }

    #[test]
    fn ratio_decision_is_a_function_of_the_trace_id() {
        let trace_id = TraceId::from(0xFEED_F00D_u128);
        let first = sample_from_trace_id(0.5, trace_id);
        for _ in 0..8 {
            assert_eq!(sample_from_trace_id(0.5, trace_id), first);
        }
    }

    #[test]
    fn ratio_tracks_the_requested_fraction() {
        let runs = 10_000;
        let mut rng = rand::thread_rng();

        for fraction in [0.25, 0.5, 0.75] {
            let sampler = Sampler::TraceIdRatioBased(fraction);
            let mut hits = 0u32;
            for _ in 0..runs {
                let trace_id = TraceId::from(rng.gen::<u128>());
                if decide(&sampler, None, trace_id) == SamplingDecision::RecordAndSample {
                    hits += 1;
                }
            }

            let observed = f64::from(hits) / f64::from(runs);
            // Wilson-style interval wide enough that a correct sampler fails
            // this less than once in a million runs
            let slack = 5.0 * (fraction * (1.0 - fraction) / f64::from(runs)).sqrt();
            assert!(
                (observed - fraction).abs() < slack,
                "fraction {fraction}: observed {observed}, slack {slack}"
            );
        }
    }

    #[test]
    fn parent_based_follows_a_valid_parent() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));
        assert_eq!(
            decide(&sampler, Some(&parent(true)), TraceId::from(1)),
            SamplingDecision::RecordAndSample
        );

        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOn));
        assert_eq!(
            decide(&sampler, Some(&parent(false)), TraceId::from(1)),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn parent_based_delegates_for_roots() {
        let on = Sampler::ParentBased(Box::new(Sampler::AlwaysOn));
        let off = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));

        // No context at all
        assert_eq!(
            decide(&on, None, TraceId::from(1)),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(decide(&off, None, TraceId::from(1)), SamplingDecision::Drop);

        // A context with no active span
        let empty = Context::new();
        assert_eq!(
            decide(&on, Some(&empty), TraceId::from(1)),
            SamplingDecision::RecordAndSample
        );

        // An invalid span context is not a parent either
        let invalid = Context::new().with_span_context(SpanContext::empty_context());
        assert_eq!(
            decide(&on, Some(&invalid), TraceId::from(1)),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            decide(&off, Some(&invalid), TraceId::from(1)),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn boxed_samplers_clone() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(0.5)));
        let clone = sampler.clone();

        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let trace_id = TraceId::from(rng.gen::<u128>());
            assert_eq!(
                decide(&sampler, None, trace_id),
                decide(&clone, None, trace_id)
            );
        }
    }

    #[test]
    fn parent_trace_state_is_carried_forward() {
        let trace_state = TraceState::from_key_value(vec![("vendor", "x")]).unwrap();
        let cx = Context::new().with_span_context(SpanContext::new(
            TraceId::from(1),
            SpanId::from(1),
            TraceFlags::SAMPLED,
            true,
            trace_state.clone(),
        ));

        let result = Sampler::AlwaysOn.should_sample(
            Some(&cx),
            TraceId::from(1),
            "keep state",
            &SpanKind::Internal,
            &[],
            &[],
        );

        assert_eq!(result.trace_state, trace_state);
    }
}
