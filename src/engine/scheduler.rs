//! Acquisition: agents claiming `Available` elements for a subscription.
//!
//! Candidates are read without locks and then claimed with a conditional
//! status update (`Available -> Negotiating`). An update that matches no
//! row means another caller claimed the element first; it is skipped and
//! the scan continues, so two concurrent acquisitions never return the same
//! element.

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info};

use crate::binder::require_subscription;
use crate::db::{Db, Transaction};
use crate::error::{Error, Result};
use crate::model::{Element, ElementId, Status, SubscriptionId};
use crate::store::require_element;
use crate::telemetry::{element as spans, metrics};

#[derive(Clone)]
pub struct Scheduler {
    db: Db,
}

impl Scheduler {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Claim up to `max_elements` elements with priority at least
    /// `min_priority` for `subscription`, highest priority first, then first
    /// in first out.
    ///
    /// Eligible elements are `Available` and either unbound or bound to
    /// `subscription`. Each claimed element ends `Acquired` and bound to
    /// `subscription` alone. All claims commit together.
    pub async fn acquire(
        &self,
        subscription: SubscriptionId,
        max_elements: u32,
        min_priority: i64,
    ) -> Result<Vec<Element>> {
        if max_elements == 0 {
            return Ok(Vec::new());
        }
        let span = spans::start_acquire_span(subscription, max_elements);
        let started = Instant::now();

        async {
            let mut tx = self.db.begin().await?;
            let result = acquire_on(&mut *tx, subscription, max_elements, min_priority).await;
            let acquired = tx.finish(result).await?;

            tracing::Span::current().record("acquire.count", acquired.len());
            metrics::acquisitions().add(
                acquired.len() as u64,
                &[KeyValue::new("subscription", subscription.0)],
            );
            metrics::acquire_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);
            info!(
                subscription = %subscription,
                requested = max_elements,
                acquired = acquired.len(),
                "acquire finished"
            );
            Ok(acquired)
        }
        .instrument(span)
        .await
    }
}

async fn acquire_on(
    tx: &mut dyn Transaction,
    subscription: SubscriptionId,
    max_elements: u32,
    min_priority: i64,
) -> Result<Vec<Element>> {
    require_subscription(tx, subscription).await?;

    let wanted = max_elements as usize;
    let mut acquired = Vec::with_capacity(wanted);
    let mut seen: HashSet<ElementId> = HashSet::new();

    // Candidates already tried come back if they are Available again, so
    // the limit leaves room for them.
    while acquired.len() < wanted {
        let limit = (wanted - acquired.len() + seen.len()) as i64;
        let fresh: Vec<Element> = tx
            .acquirable_elements(subscription, min_priority, limit)
            .await?
            .into_iter()
            .filter(|candidate| seen.insert(candidate.id))
            .collect();
        if fresh.is_empty() {
            break;
        }
        for candidate in fresh {
            if acquired.len() == wanted {
                break;
            }
            if let Some(element) = claim(tx, candidate.id, subscription).await? {
                acquired.push(element);
            }
        }
    }
    Ok(acquired)
}

/// Move one candidate `Available -> Negotiating -> Acquired` and fix its
/// binding. `None` when the candidate is no longer eligible.
async fn claim(
    tx: &mut dyn Transaction,
    id: ElementId,
    subscription: SubscriptionId,
) -> Result<Option<Element>> {
    let now = Utc::now();
    if !tx
        .swap_status(id, Status::Available, Status::Negotiating, now)
        .await?
    {
        metrics::lost_races().add(1, &[]);
        debug!(element = %id, "lost acquisition race");
        return Ok(None);
    }
    count_transition(Status::Available, Status::Negotiating);

    // Bindings committed between the candidate read and the swap are
    // visible now that the row is ours.
    let bound = tx.subscriptions_for(id).await?;
    if !bound.is_empty() && !bound.iter().any(|s| s.id == subscription) {
        if !tx
            .swap_status(id, Status::Negotiating, Status::Available, now)
            .await?
        {
            return Err(Error::Integrity(format!(
                "element {id} left Negotiating during acquisition"
            )));
        }
        count_transition(Status::Negotiating, Status::Available);
        debug!(element = %id, "bound elsewhere, negotiation abandoned");
        return Ok(None);
    }

    if !tx
        .swap_status(id, Status::Negotiating, Status::Acquired, now)
        .await?
    {
        return Err(Error::Integrity(format!(
            "element {id} left Negotiating during acquisition"
        )));
    }
    count_transition(Status::Negotiating, Status::Acquired);

    tx.insert_association(id, subscription).await?;
    tx.retain_association(id, subscription).await?;
    debug!(element = %id, subscription = %subscription, "element acquired");
    require_element(tx, id).await.map(Some)
}

fn count_transition(from: Status, to: Status) {
    metrics::status_transitions().add(
        1,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueuePolicy;
    use crate::engine::WorkQueue;
    use crate::model::NewElement;

    async fn test_queue() -> WorkQueue {
        WorkQueue::new(Db::in_memory().await.unwrap(), QueuePolicy::new(1))
    }

    #[tokio::test]
    async fn claim_skips_element_taken_since_the_candidate_read() {
        let queue = test_queue().await;
        let sub = queue.binder().create("agents").await.unwrap();
        let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();
        // Another agent wins the element after this one listed it.
        queue.acquire(sub.id, 1, 0).await.unwrap();

        let mut tx = queue.db().begin().await.unwrap();
        let claimed = claim(&mut *tx, id, sub.id).await;
        tx.rollback().await.unwrap();

        assert!(claimed.unwrap().is_none());
        assert_eq!(queue.store().get(id, None).await.unwrap().status, Status::Acquired);
    }

    #[tokio::test]
    async fn claim_hands_back_element_bound_elsewhere() {
        let queue = test_queue().await;
        let mine = queue.binder().create("mine").await.unwrap();
        let theirs = queue.binder().create("theirs").await.unwrap();
        let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();
        // Bound after the candidate read, before the swap.
        queue.binder().bind(id, theirs.id, None).await.unwrap();

        let mut tx = queue.db().begin().await.unwrap();
        let claimed = claim(&mut *tx, id, mine.id).await;
        tx.commit().await.unwrap();

        assert!(claimed.unwrap().is_none());
        let element = queue.store().get(id, None).await.unwrap();
        assert_eq!(element.status, Status::Available);
        assert_eq!(queue.binder().subscriptions_for(id, None).await.unwrap(), vec![theirs]);
    }
}
