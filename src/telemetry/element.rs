//! Span helpers for element acquisition and lifecycle changes.

use tracing::Span;

use crate::model::{ElementId, Status, SubscriptionId};

/// Span covering one `acquire` call. `acquire.count` is filled in when the
/// batch is complete.
pub fn start_acquire_span(subscription: SubscriptionId, max_elements: u32) -> Span {
    tracing::info_span!(
        "workqueue.acquire",
        "subscription.id" = %subscription,
        "acquire.max" = max_elements,
        "acquire.count" = tracing::field::Empty,
    )
}

/// Span covering one status change of one element.
pub fn start_transition_span(element: ElementId, to: Status) -> Span {
    tracing::debug_span!(
        "workqueue.transition",
        "element.id" = %element,
        "element.to" = %to,
    )
}

/// Emit a transition event scoped to `span`.
pub fn record_transition(span: &Span, element: ElementId, from: Status, to: Status) {
    span.in_scope(|| {
        tracing::debug!(element = %element, from = %from, to = %to, "status_transition");
    });
}
