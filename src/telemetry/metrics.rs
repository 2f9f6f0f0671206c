//! Metric instrument factories.
//!
//! Instruments come from the `"workqueue"` meter on the globally registered
//! `MeterProvider`; without one they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("workqueue")
}

/// Counter: elements inserted.
/// Labels: `spec`.
pub fn elements_inserted() -> Counter<u64> {
    meter()
        .u64_counter("workqueue.element.inserted")
        .with_description("Number of work-queue elements inserted")
        .build()
}

/// Counter: element status transitions.
/// Labels: `from`, `to`.
pub fn status_transitions() -> Counter<u64> {
    meter()
        .u64_counter("workqueue.element.status_transitions")
        .with_description("Number of element status transitions")
        .build()
}

/// Counter: elements acquired.
/// Labels: `subscription`.
pub fn acquisitions() -> Counter<u64> {
    meter()
        .u64_counter("workqueue.acquire.elements")
        .with_description("Number of elements acquired by agents")
        .build()
}

/// Counter: compare-and-swap updates that matched no row during acquisition.
pub fn lost_races() -> Counter<u64> {
    meter()
        .u64_counter("workqueue.acquire.lost_races")
        .with_description("Acquisition candidates taken by a concurrent caller")
        .build()
}

/// Counter: block parentage edges recorded.
pub fn parentage_edges() -> Counter<u64> {
    meter()
        .u64_counter("workqueue.lineage.edges")
        .with_description("Number of block parentage edges recorded")
        .build()
}

/// Histogram: duration of one `acquire` call in milliseconds.
pub fn acquire_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workqueue.acquire.duration_ms")
        .with_description("Acquisition duration in milliseconds")
        .with_unit("ms")
        .build()
}
