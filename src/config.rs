//! Process-wide tracing configuration.
//!
//! The head sampler consulted by [`Tracer::start_span`] is looked up at span
//! creation time, not at tracer construction time, so the sampling policy can
//! be installed once per process (typically during startup, before any
//! requests are handled) and every tracer picks it up. Until [`init`] is
//! called, a default configuration of [`Sampler::ParentBased`] over
//! [`Sampler::AlwaysOn`] is in effect.
//!
//! Tests that must not observe each other's sampling policy can bypass the
//! process-wide configuration entirely with
//! [`TracerBuilder::with_config`].
//!
//! [`Tracer::start_span`]: crate::trace::Tracer::start_span
//! [`Sampler::ParentBased`]: crate::trace::Sampler::ParentBased
//! [`Sampler::AlwaysOn`]: crate::trace::Sampler::AlwaysOn
//! [`TracerBuilder::with_config`]: crate::trace::TracerBuilder::with_config

use crate::trace::{Sampler, ShouldSample};
use crate::{TraceError, TraceResult};
use once_cell::sync::Lazy;
use std::sync::{Arc, RwLock};

static ACTIVE_CONFIG: Lazy<RwLock<Option<Arc<TracingConfig>>>> = Lazy::new(|| RwLock::new(None));

static DEFAULT_CONFIG: Lazy<Arc<TracingConfig>> =
    Lazy::new(|| Arc::new(TracingConfig::default()));

/// The tracing configuration shared by all tracers in the process.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    head_sampler: Box<dyn ShouldSample>,
}

impl TracingConfig {
    /// Returns a builder for a `TracingConfig`.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    /// The sampler consulted for every new span.
    pub fn head_sampler(&self) -> &dyn ShouldSample {
        self.head_sampler.as_ref()
    }
}

impl Default for TracingConfig {
    /// Respect a parent's sampling decision and sample all root spans.
    fn default() -> Self {
        TracingConfig {
            head_sampler: Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
        }
    }
}

/// A builder for [`TracingConfig`].
#[derive(Debug, Default)]
pub struct TracingConfigBuilder {
    head_sampler: Option<Box<dyn ShouldSample>>,
}

impl TracingConfigBuilder {
    /// The sampler to consult for every new span.
    pub fn with_head_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.head_sampler = Some(Box::new(sampler));
        self
    }

    /// Build a [`TracingConfig`], falling back to defaults for unset options.
    pub fn build(self) -> TracingConfig {
        let default = TracingConfig::default();
        TracingConfig {
            head_sampler: self.head_sampler.unwrap_or(default.head_sampler),
        }
    }
}

/// Install the process-wide tracing configuration.
///
/// Returns [`TraceError::AlreadyInitialized`] if a configuration has already
/// been installed and not shut down; re-configuring a live process would
/// apply inconsistent sampling decisions within a single trace.
pub fn init(config: TracingConfig) -> TraceResult<()> {
    let mut active = ACTIVE_CONFIG
        .write()
        .map_err(|_| TraceError::from("tracing configuration lock poisoned"))?;
    if active.is_some() {
        return Err(TraceError::AlreadyInitialized);
    }
    *active = Some(Arc::new(config));
    Ok(())
}

/// Returns the active tracing configuration, or the default configuration if
/// [`init`] has not been called.
pub fn active() -> Arc<TracingConfig> {
    ACTIVE_CONFIG
        .read()
        .ok()
        .and_then(|active| active.clone())
        .unwrap_or_else(|| DEFAULT_CONFIG.clone())
}

/// Remove the process-wide tracing configuration, restoring the default.
///
/// After shutdown, [`init`] may be called again.
pub fn shutdown() {
    if let Ok(mut active) = ACTIVE_CONFIG.write() {
        *active = None;
    }
}
