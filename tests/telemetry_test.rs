//! Telemetry initialization and span helpers.

use workqueue::model::{ElementId, Status, SubscriptionId};
use workqueue::telemetry::{TelemetryConfig, element, init_telemetry, metrics};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; a second
    // attempt returns Err, which is acceptable here.
    let _guard = init_telemetry(TelemetryConfig::new("workqueue-test"));
}

#[test]
fn invalid_log_level_is_a_config_error() {
    unsafe {
        std::env::remove_var("RUST_LOG");
    }
    let config = TelemetryConfig {
        log_level: "workqueue=loud".to_string(),
        ..TelemetryConfig::new("workqueue-test")
    };
    assert!(init_telemetry(config).is_err());
}

#[test]
fn acquire_span_records_count() {
    let span = element::start_acquire_span(SubscriptionId(1), 8);
    span.record("acquire.count", 3_u64);
}

#[test]
fn transition_span_records_event() {
    let span = element::start_transition_span(ElementId(7), Status::Running);
    element::record_transition(&span, ElementId(7), Status::Acquired, Status::Running);
}

#[test]
fn instruments_build_without_a_provider() {
    metrics::elements_inserted().add(1, &[]);
    metrics::lost_races().add(1, &[]);
    metrics::acquire_duration_ms().record(1.5, &[]);
}
