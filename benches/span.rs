use criterion::{criterion_group, criterion_main, Criterion};
use worker_tracer::config::TracingConfig;
use worker_tracer::trace::{Sampler, Span, SpanData, SpanProcessor, Tracer};
use worker_tracer::{Context, KeyValue, TraceResult};

#[derive(Debug)]
struct NoopProcessor;

impl SpanProcessor for NoopProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}
    fn on_end(&self, _span: SpanData) {}
    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }
    fn shutdown(&self) -> TraceResult<()> {
        Ok(())
    }
}

fn tracer(sampler: Sampler) -> Tracer {
    Tracer::builder()
        .with_span_processor(NoopProcessor)
        .with_config(TracingConfig::builder().with_head_sampler(sampler).build())
        .build()
}

fn criterion_benchmark(c: &mut Criterion) {
    let sampled = tracer(Sampler::AlwaysOn);
    c.bench_function("start-end-span", |b| {
        b.iter(|| {
            let mut span = sampled.start_span("bench");
            span.end();
        })
    });

    c.bench_function("start-end-span-4-attrs", |b| {
        b.iter(|| {
            let mut span = sampled.start_span("bench");
            span.set_attribute(KeyValue::new("key1", false));
            span.set_attribute(KeyValue::new("key2", "hello"));
            span.set_attribute(KeyValue::new("key3", 123.456));
            span.set_attribute(KeyValue::new("key4", 123));
            span.end();
        })
    });

    let dropped = tracer(Sampler::AlwaysOff);
    c.bench_function("start-end-dropped-span", |b| {
        b.iter(|| {
            let mut span = dropped.start_span("bench");
            span.end();
        })
    });

    c.bench_function("start-end-active-span", |b| {
        b.iter(|| {
            sampled.start_active_span("bench", |span| {
                span.end();
            })
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
