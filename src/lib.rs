//! An OpenTelemetry-compatible tracer and span core.
//!
//! This crate implements the data model and lifecycle of distributed tracing
//! for lightweight worker runtimes: [`trace::Span`]s identified by W3C
//! trace ids, head [`trace::Sampler`]s, ambient [`Context`] propagation, and
//! fan-out of finished spans to pluggable [`trace::SpanProcessor`]s. It
//! deliberately stops at the processor boundary; exporters, batching, and
//! wire protocols live elsewhere.
//!
//! # Getting started
//!
//! ```
//! use worker_tracer::config::{self, TracingConfig};
//! use worker_tracer::trace::{Sampler, Tracer};
//! use worker_tracer::KeyValue;
//!
//! // Install the process-wide sampling policy once, during startup
//! let _ = config::init(
//!     TracingConfig::builder()
//!         .with_head_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
//!         .build(),
//! );
//!
//! let tracer = Tracer::builder().build();
//!
//! tracer.start_active_span("handle_request", |span| {
//!     span.set_attribute(KeyValue::new("http.route", "/users/:id"));
//!     span.end();
//! });
//! # config::shutdown();
//! ```
//!
//! # Feature flags
//!
//! - `internal-logs` (default): self-diagnostics of the tracer core are
//!   emitted through the [`tracing`](https://crates.io/crates/tracing) crate.
//! - `testing`: in-memory processors and deterministic id generation, for
//!   use in tests.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![allow(clippy::needless_doctest_main)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod trace;

mod common;
pub use common::{Array, Key, KeyValue, StringValue, Value};

mod context;
pub use context::{Context, ContextGuard, FutureExt, WithContext};

mod error;
pub use error::{TraceError, TraceResult};

mod resource;
pub use resource::Resource;

#[doc(hidden)]
mod internal_logging;

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, warn};
}
