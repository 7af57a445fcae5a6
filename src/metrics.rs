//! Metrics for observability.
//!
//! Prometheus-compatible metrics covering the write path and the
//! replication consumers. All metrics are prefixed with `catalog_`;
//! counters end in `_total`, histograms track durations in seconds.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a completed origin-side write (create/update/remove).
pub fn record_write(kind: &'static str, verb: &'static str) {
    counter!("catalog_writes_total", "kind" => kind, "verb" => verb).increment(1);
}

/// Record a write rejected by the integrity validator.
pub fn record_integrity_rejection(kind: &'static str) {
    counter!("catalog_integrity_rejections_total", "kind" => kind).increment(1);
}

/// Record a publish failure (the write was rolled back).
pub fn record_publish_failure(exchange: &str) {
    counter!("catalog_publish_failures_total", "exchange" => exchange.to_string()).increment(1);
}

/// Record a successfully applied remote event.
pub fn record_event_applied(kind: &'static str) {
    counter!("catalog_events_applied_total", "kind" => kind).increment(1);
}

/// Record a remote event skipped as already converged (duplicate create
/// or duplicate-key conflict collapsed into success).
pub fn record_event_deduped(kind: &'static str) {
    counter!("catalog_events_deduped_total", "kind" => kind).increment(1);
}

/// Record a retry of a failed apply.
pub fn record_apply_retry(kind: &'static str) {
    counter!("catalog_apply_retries_total", "kind" => kind).increment(1);
}

/// Record an event routed to the dead-letter exchange.
pub fn record_dead_letter(kind: &'static str, reason: &'static str) {
    counter!("catalog_dead_letters_total", "kind" => kind, "reason" => reason).increment(1);
}

/// Record the latency of one apply (including retries).
pub fn record_apply_duration(kind: &'static str, duration: Duration) {
    histogram!("catalog_apply_duration_seconds", "kind" => kind).record(duration.as_secs_f64());
}
