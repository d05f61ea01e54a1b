/// Logs a debug-level self-diagnostic event from the tracer core.
///
/// Events go through the `tracing` crate when the `internal-logs` feature is
/// on and compile out entirely otherwise. Self-diagnostics never panic and
/// never surface errors to the instrumented application.
#[macro_export]
macro_rules! tracer_debug {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        $crate::_private::debug!(
            name: $name,
            target: env!("CARGO_PKG_NAME"),
            name = $name
            $(, $key = $value)*
        );
        #[cfg(not(feature = "internal-logs"))]
        let _ = ($name $(, $value)*);
    }};
}

/// Logs a warning from the tracer core, such as a discarded attribute key or
/// a panicking span processor.
#[macro_export]
macro_rules! tracer_warn {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {{
        #[cfg(feature = "internal-logs")]
        $crate::_private::warn!(
            name: $name,
            target: env!("CARGO_PKG_NAME"),
            name = $name
            $(, $key = $value)*
        );
        #[cfg(not(feature = "internal-logs"))]
        let _ = ($name $(, $value)*);
    }};
}
