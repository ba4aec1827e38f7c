// Metrics for lock operations
// Recorded through the `metrics` facade; the host application installs the exporter.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const ACQUIRE_TOTAL: &str = "quorumlock_acquire_total";
pub const ACQUIRE_DURATION: &str = "quorumlock_acquire_duration_seconds";
pub const EXTEND_TOTAL: &str = "quorumlock_extend_total";
pub const RELEASE_TOTAL: &str = "quorumlock_release_total";
pub const STORE_ERRORS_TOTAL: &str = "quorumlock_store_errors_total";

/// Register metric descriptions. Call once at startup.
pub fn describe_metrics() {
    describe_counter!(
        ACQUIRE_TOTAL,
        "Lock acquisitions by outcome (acquired, unavailable, cancelled)"
    );
    describe_histogram!(
        ACQUIRE_DURATION,
        "Time spent in acquire, including retries, in seconds"
    );
    describe_counter!(EXTEND_TOTAL, "Lock extensions by outcome (extended, lost)");
    describe_counter!(RELEASE_TOTAL, "Explicit lock releases");
    describe_counter!(
        STORE_ERRORS_TOTAL,
        "Store calls that failed or timed out, by store and operation"
    );
}

pub(crate) fn record_acquire(outcome: &'static str, elapsed: Duration) {
    counter!(ACQUIRE_TOTAL, "outcome" => outcome).increment(1);
    histogram!(ACQUIRE_DURATION).record(elapsed.as_secs_f64());
}

pub(crate) fn record_extend(outcome: &'static str) {
    counter!(EXTEND_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_release() {
    counter!(RELEASE_TOTAL).increment(1);
}

pub(crate) fn record_store_error(store: &str, op: &'static str) {
    counter!(STORE_ERRORS_TOTAL, "store" => store.to_string(), "op" => op).increment(1);
}
