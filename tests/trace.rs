use worker_tracer::config::TracingConfig;
use worker_tracer::trace::{
    InMemorySpanProcessor, IncrementIdGenerator, Sampler, SpanContext, SpanId, TraceFlags,
    TraceId, TraceState, Tracer,
};
use worker_tracer::{Context, FutureExt, KeyValue};

fn tracer_with(processor: InMemorySpanProcessor, sampler: Sampler) -> Tracer {
    Tracer::builder()
        .with_span_processor(processor)
        .with_id_generator(IncrementIdGenerator::new())
        .with_config(TracingConfig::builder().with_head_sampler(sampler).build())
        .build()
}

#[test]
fn span_trees_are_reconstructible_from_exported_spans() {
    let processor = InMemorySpanProcessor::default();
    let tracer = tracer_with(processor.clone(), Sampler::AlwaysOn);

    tracer.start_active_span("request", |request| {
        tracer.start_active_span("query", |query| {
            let mut lookup = tracer.start_span("cache_lookup");
            lookup.end();
            query.end();
        });
        request.end();
    });

    let spans = processor.spans();
    assert_eq!(spans.len(), 3);

    let lookup = &spans[0];
    let query = &spans[1];
    let request = &spans[2];

    assert_eq!(request.name, "request");
    assert_eq!(request.parent_span_id, SpanId::INVALID);
    assert_eq!(query.parent_span_id, request.span_context.span_id());
    assert_eq!(lookup.parent_span_id, query.span_context.span_id());

    // One trace across the whole tree
    let trace_id = request.span_context.trace_id();
    assert!(spans.iter().all(|s| s.span_context.trace_id() == trace_id));
}

#[test]
fn active_spans_follow_futures_across_suspension_points() {
    use futures_executor::block_on;
    use std::future::poll_fn;
    use std::task::Poll;

    async fn yield_once() {
        let mut yielded = false;
        poll_fn(move |cx| {
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

    let processor = InMemorySpanProcessor::default();
    let tracer = tracer_with(processor.clone(), Sampler::AlwaysOn);

    let mut parent = tracer.start_span("async_parent");
    let cx = Context::current_with_span_context(parent.span_context().clone());

    block_on(
        async {
            // Resume at least once so the child is started on a later poll
            yield_once().await;
            let mut child = tracer.start_span("async_child");
            child.end();
        }
        .with_context(cx),
    );
    parent.end();

    let spans = processor.spans();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].name, "async_child");
    assert_eq!(spans[0].parent_span_id, parent.span_context().span_id());
    assert_eq!(
        spans[0].span_context.trace_id(),
        parent.span_context().trace_id()
    );
}

#[test]
fn remote_parent_trace_state_flows_into_children() {
    let processor = InMemorySpanProcessor::default();
    let tracer = tracer_with(
        processor.clone(),
        Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
    );

    let trace_state = TraceState::from_key_value(vec![("congo", "t61rcWkgMzE")]).unwrap();
    let remote = SpanContext::new(
        TraceId::from(0x4BF9_2F35_77B3_4DA6),
        SpanId::from(0x00F0_67AA_0BA9_02B7),
        TraceFlags::SAMPLED,
        true,
        trace_state.clone(),
    );

    let cx = Context::new().with_span_context(remote);
    let mut span = tracer.start_span_with_context("continuation", &cx);

    assert_eq!(span.span_context().trace_state(), &trace_state);
    assert_eq!(
        span.span_context().trace_state().header(),
        "congo=t61rcWkgMzE"
    );
    span.end();
}

#[test]
fn ratio_sampling_is_coherent_within_a_trace() {
    let sampler = Sampler::TraceIdRatioBased(0.5);

    for _ in 0..100 {
        let processor = InMemorySpanProcessor::default();
        let tracer = Tracer::builder()
            .with_span_processor(processor)
            .with_config(
                TracingConfig::builder()
                    .with_head_sampler(sampler.clone())
                    .build(),
            )
            .build();

        let root = tracer.start_span("root");
        let cx = Context::new().with_span_context(root.span_context().clone());
        let child = tracer.start_span_with_context("child", &cx);

        // Same trace id, so the ratio sampler must reach the same decision
        assert_eq!(
            root.span_context().is_sampled(),
            child.span_context().is_sampled()
        );
    }
}

#[test]
fn sampler_attributes_are_merged_into_the_span() {
    use worker_tracer::trace::{
        Link, SamplingDecision, SamplingResult, ShouldSample, SpanBuilder, SpanKind,
    };

    #[derive(Clone, Debug)]
    struct AnnotatingSampler;

    impl ShouldSample for AnnotatingSampler {
        fn should_sample(
            &self,
            _parent_context: Option<&Context>,
            _trace_id: TraceId,
            _name: &str,
            _span_kind: &SpanKind,
            _attributes: &[KeyValue],
            _links: &[Link],
        ) -> SamplingResult {
            SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                attributes: vec![KeyValue::new("sampling.rule", "annotate-everything")],
                trace_state: TraceState::default(),
            }
        }
    }

    let processor = InMemorySpanProcessor::default();
    let tracer = Tracer::builder()
        .with_span_processor(processor.clone())
        .with_config(
            TracingConfig::builder()
                .with_head_sampler(AnnotatingSampler)
                .build(),
        )
        .build();

    // The builder sets the same key; the sampler's value must replace it
    // rather than produce a duplicate entry.
    let mut span = tracer.build(
        SpanBuilder::from_name("annotated")
            .with_attributes([KeyValue::new("sampling.rule", "placeholder")]),
    );
    span.end();

    let spans = processor.spans();
    let rules: Vec<_> = spans[0]
        .attributes
        .iter()
        .filter(|kv| kv.key.as_str() == "sampling.rule")
        .collect();
    assert_eq!(rules, vec![&KeyValue::new("sampling.rule", "annotate-everything")]);
}

#[test]
fn record_only_spans_record_without_the_sampled_flag() {
    use worker_tracer::trace::{
        Link, SamplingDecision, SamplingResult, ShouldSample, SpanKind,
    };

    #[derive(Clone, Debug)]
    struct RecordOnlySampler;

    impl ShouldSample for RecordOnlySampler {
        fn should_sample(
            &self,
            _parent_context: Option<&Context>,
            _trace_id: TraceId,
            _name: &str,
            _span_kind: &SpanKind,
            _attributes: &[KeyValue],
            _links: &[Link],
        ) -> SamplingResult {
            SamplingResult {
                decision: SamplingDecision::RecordOnly,
                attributes: vec![],
                trace_state: TraceState::default(),
            }
        }
    }

    let processor = InMemorySpanProcessor::default();
    let tracer = Tracer::builder()
        .with_span_processor(processor.clone())
        .with_config(
            TracingConfig::builder()
                .with_head_sampler(RecordOnlySampler)
                .build(),
        )
        .build();

    let mut span = tracer.start_span("recorded_not_sampled");
    assert!(span.is_recording());
    assert!(!span.span_context().is_sampled());
    span.end();

    // Recorded spans reach processors even when unsampled
    assert_eq!(processor.spans().len(), 1);
}

#[test]
fn shutdown_clears_the_in_memory_processor() {
    let processor = InMemorySpanProcessor::default();
    let tracer = tracer_with(processor.clone(), Sampler::AlwaysOn);

    let mut span = tracer.start_span("short_lived");
    span.end();
    assert_eq!(processor.spans().len(), 1);

    assert!(tracer.shutdown().is_ok());
    assert!(processor.spans().is_empty());
}

#[test]
fn unended_spans_are_never_exported() {
    let processor = InMemorySpanProcessor::default();
    let tracer = tracer_with(processor.clone(), Sampler::AlwaysOn);

    {
        let _span = tracer.start_span("abandoned");
        // Dropped without end(): cancelled work produces no record
    }

    assert!(processor.spans().is_empty());
}
