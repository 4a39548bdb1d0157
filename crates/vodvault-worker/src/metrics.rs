//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder every
//! call is a no-op.

use metrics::{counter, histogram};
use vodvault_models::ItemOutcome;

/// Metric names as constants for consistency.
pub mod names {
    pub const ITEMS_TOTAL: &str = "vodvault_items_total";
    pub const FETCH_ATTEMPTS_TOTAL: &str = "vodvault_fetch_attempts_total";
    pub const UPLOADS_TOTAL: &str = "vodvault_uploads_total";
    pub const UPLOAD_DURATION_SECONDS: &str = "vodvault_upload_duration_seconds";
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a finished item chain.
pub fn record_item(outcome: ItemOutcome) {
    let labels = [("outcome", outcome.as_str().to_string())];
    counter!(names::ITEMS_TOTAL, &labels).increment(1);
}

/// Record one metadata fetch against a single id variant.
pub fn record_fetch_attempt(success: bool) {
    let labels = [("result", result_label(success).to_string())];
    counter!(names::FETCH_ATTEMPTS_TOTAL, &labels).increment(1);
}

/// Record an upload, retries included.
pub fn record_upload(success: bool, duration_secs: f64) {
    let labels = [("result", result_label(success).to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    histogram!(names::UPLOAD_DURATION_SECONDS, &labels).record(duration_secs);
}
