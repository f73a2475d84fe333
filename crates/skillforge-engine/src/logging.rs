//! Thin engine-specific layer over [`tooling::logging`]: a span helper for
//! one orchestrator tick and the redaction pass applied before any
//! credential-adjacent value reaches a log line. Timed-future helpers and
//! the `LogGuard` RAII span already live in `tooling`; nothing here
//! reimplements them.

pub use tooling::logging::{format_bytes, format_duration, sanitize_for_logging, timed, timed_with_level, LogGuard, LogLevel};

/// Span a single `drive()` tick: entering and exiting are logged the way
/// [`LogGuard`] logs any scope, named consistently so a trace of a run's
/// ticks reads as one thread_id with one line per tick.
pub fn tick_guard(thread_id: &str) -> LogGuard {
    LogGuard::new(format!("drive[{thread_id}]"))
}

/// Redact a value before it's attached to a log line or span field. Strings
/// go through [`sanitize_for_logging`]; every other JSON value is passed
/// through unchanged since the redaction patterns only match against
/// credential-shaped text.
pub fn sanitize_value_for_logging(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(sanitize_for_logging(s)),
        serde_json::Value::Object(map) => serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), sanitize_value_for_logging(v))).collect()),
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sanitize_value_for_logging).collect()),
        other => other.clone(),
    }
}
