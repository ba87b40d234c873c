//! Metrics module
//!
//! Provides Prometheus metrics for the upload queue, widget registry and
//! template previews.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "cms_uploads_total",
        "Upload attempts by namespace and outcome",
        &["namespace", "outcome"]  // completed, failed, rejected, retried, cancelled
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "cms_upload_bytes_total",
        "Total bytes of completed uploads"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "cms_upload_duration_seconds",
        "Upload attempt duration in seconds",
        &["namespace"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Registry metrics
    pub static ref REGISTRY_LOOKUPS: CounterVec = register_counter_vec!(
        "cms_registry_lookups_total",
        "Widget registry lookups",
        &["result"]  // "hit" or "miss"
    ).unwrap();

    // Template metrics
    pub static ref TEMPLATE_RENDERS: Counter = register_counter!(
        "cms_template_renders_total",
        "Preview templates rendered"
    ).unwrap();
}

/// Record the outcome of an upload attempt
pub fn record_upload_outcome(namespace: &str, outcome: &str) {
    UPLOADS_TOTAL.with_label_values(&[namespace, outcome]).inc();
}

/// Record bytes of a completed upload
pub fn record_upload_bytes(bytes: u64) {
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record upload attempt duration
pub fn record_upload_duration(namespace: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[namespace])
        .observe(duration_secs);
}

/// Record a widget registry lookup
pub fn record_registry_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    REGISTRY_LOOKUPS.with_label_values(&[result]).inc();
}

/// Record a template render
pub fn record_template_render() {
    TEMPLATE_RENDERS.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_upload_outcome() {
        record_upload_outcome("media", "completed");
        assert!(UPLOADS_TOTAL.with_label_values(&["media", "completed"]).get() >= 1.0);
    }

    #[test]
    fn test_record_upload_duration() {
        record_upload_duration("media", 0.25);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_registry_lookup() {
        record_registry_lookup(true);
        record_registry_lookup(false);
        assert!(REGISTRY_LOOKUPS.with_label_values(&["miss"]).get() >= 1.0);
    }

    #[test]
    fn test_record_template_render() {
        record_template_render();
        assert!(TEMPLATE_RENDERS.get() >= 1.0);
    }
}
