//! Element persistence and validated status changes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::debug;

use crate::config::QueuePolicy;
use crate::db::{Db, ElementInsert, Transaction, Tx};
use crate::error::{Error, Result};
use crate::lineage;
use crate::model::{Element, ElementId, NewElement, Status};
use crate::telemetry::{element as spans, metrics};
use crate::validate;

/// Reads and writes work-queue elements.
///
/// Point reads and every mutating method take `within`: pass an open [`Tx`]
/// to compose the call with others atomically, or `None` to run it in its
/// own transaction. On SQLite the pool holds one connection, so a caller
/// holding a `Tx` must pass it here rather than `None`.
#[derive(Clone)]
pub struct ElementStore {
    db: Db,
    policy: QueuePolicy,
}

impl ElementStore {
    pub fn new(db: Db, policy: QueuePolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    /// Insert a new `Available` element, creating its block if needed.
    pub async fn insert(&self, new: NewElement, within: Option<&mut Tx>) -> Result<ElementId> {
        validate::identifier(&new.spec_name)?;
        validate::priority(new.priority)?;
        if new.number_of_jobs < 1 {
            return Err(Error::InvalidInput(format!(
                "number_of_jobs must be at least 1, got {}",
                new.number_of_jobs
            )));
        }
        if let Some(block) = &new.block_name {
            validate::block_name(block)?;
        }

        let mut scope = self.db.scope(within).await?;
        let result = insert_on(scope.tx(), &new).await;
        scope.finish(result).await
    }

    /// Fetch one element.
    pub async fn get(&self, id: ElementId, within: Option<&mut Tx>) -> Result<Element> {
        let mut scope = self.db.scope(within).await?;
        let result = require_element(scope.tx(), id).await;
        scope.finish(result).await
    }

    /// All elements of one job specification, oldest first.
    pub async fn by_spec(&self, spec_name: &str, within: Option<&mut Tx>) -> Result<Vec<Element>> {
        validate::identifier(spec_name)?;
        let mut scope = self.db.scope(within).await?;
        let result = scope.tx().elements_by_spec(spec_name).await;
        scope.finish(result).await
    }

    /// Elements in `status`, highest priority first, then first in first out.
    pub async fn list_by_status(
        &self,
        status: Status,
        within: Option<&mut Tx>,
    ) -> Result<Vec<Element>> {
        let mut scope = self.db.scope(within).await?;
        let result = scope.tx().elements_by_status(status).await;
        scope.finish(result).await
    }

    pub async fn spec_exists(&self, spec_name: &str) -> Result<bool> {
        validate::identifier(spec_name)?;
        let mut tx = self.db.begin().await?;
        let result = tx.spec_exists(spec_name).await;
        tx.finish(result).await
    }

    /// Elements sitting in `status` without an update for at least
    /// `older_than`, least recently updated first.
    pub async fn stale(&self, status: Status, older_than: Duration) -> Result<Vec<Element>> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|e| Error::InvalidInput(format!("staleness window out of range: {e}")))?;
        let before = Utc::now() - older_than;
        let mut tx = self.db.begin().await?;
        let result = tx.stale_elements(status, before).await;
        tx.finish(result).await
    }

    pub async fn update_priority(
        &self,
        id: ElementId,
        priority: i64,
        within: Option<&mut Tx>,
    ) -> Result<Element> {
        validate::priority(priority)?;
        let mut scope = self.db.scope(within).await?;
        let result = async {
            let tx = scope.tx();
            if !tx.update_priority(id, priority, Utc::now()).await? {
                return Err(Error::NotFound(format!("element {id}")));
            }
            debug!(element = %id, priority, "priority updated");
            require_element(tx, id).await
        }
        .await;
        scope.finish(result).await
    }

    /// Move an element to `to` along an allowed edge.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when the edge is not allowed, the retry budget is
    /// spent, or another writer changed the status first.
    pub async fn update_status(
        &self,
        id: ElementId,
        to: Status,
        within: Option<&mut Tx>,
    ) -> Result<Element> {
        let max_retries = self.policy.max_retries;
        let mut scope = self.db.scope(within).await?;
        let result = transition_on(scope.tx(), id, to, max_retries).await;
        scope.finish(result).await
    }

    /// Remove an element and its settled associations.
    ///
    /// # Errors
    ///
    /// `Conflict` while the element is unsettled and still bound to a
    /// subscription.
    pub async fn delete(&self, id: ElementId, within: Option<&mut Tx>) -> Result<()> {
        let mut scope = self.db.scope(within).await?;
        let result = async {
            let tx = scope.tx();
            let element = require_element(tx, id).await?;
            if !element.status.is_settled() && !tx.subscriptions_for(id).await?.is_empty() {
                return Err(Error::Conflict(format!(
                    "element {id} is {} and bound to a subscription",
                    element.status
                )));
            }
            tx.delete_associations(id).await?;
            tx.delete_element(id).await?;
            debug!(element = %id, "element deleted");
            Ok(())
        }
        .await;
        scope.finish(result).await
    }

    /// Delete settled elements last updated before `before`, with their
    /// associations. Returns how many elements were removed.
    pub async fn purge_terminal(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.db.begin().await?;
        let result = tx.purge_settled(before).await;
        let purged = tx.finish(result).await?;
        debug!(purged, %before, "settled elements purged");
        Ok(purged)
    }
}

pub(crate) async fn insert_on(tx: &mut dyn Transaction, new: &NewElement) -> Result<ElementId> {
    let block_id = match &new.block_name {
        Some(name) => Some(lineage::ensure_block_on(tx, name).await?),
        None => None,
    };
    let id = tx
        .insert_element(&ElementInsert {
            spec_name: &new.spec_name,
            status: Status::Available,
            priority: new.priority,
            block_id,
            number_of_jobs: new.number_of_jobs,
            now: Utc::now(),
        })
        .await?;
    metrics::elements_inserted().add(1, &[KeyValue::new("spec", new.spec_name.clone())]);
    debug!(element = %id, spec = %new.spec_name, "element inserted");
    Ok(id)
}

pub(crate) async fn require_element(tx: &mut dyn Transaction, id: ElementId) -> Result<Element> {
    tx.element(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("element {id}")))
}

/// Check `element.status -> to` against the transition table and the retry
/// budget.
pub(crate) fn check_transition(element: &Element, to: Status, max_retries: u32) -> Result<()> {
    let from = element.status;
    let within_budget = element.retry_count <= i64::from(max_retries);
    let retry = from == Status::Failed && to == Status::Available;
    if from.can_transition_to(to) && (!retry || within_budget) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

/// Validated compare-and-swap of one element's status. Returns the element
/// as stored afterwards.
///
/// `Running -> Failed` counts the failure. An element returning to
/// `Available` after acquisition loses its binding.
pub(crate) async fn transition_on(
    tx: &mut dyn Transaction,
    id: ElementId,
    to: Status,
    max_retries: u32,
) -> Result<Element> {
    let element = require_element(tx, id).await?;
    let from = element.status;
    check_transition(&element, to, max_retries)?;

    let span = spans::start_transition_span(id, to);
    let now = Utc::now();
    let swapped = match (from, to) {
        (Status::Running, Status::Failed) => tx.record_failure(id, now).await?,
        _ => tx.swap_status(id, from, to, now).await?,
    };
    if !swapped {
        return Err(Error::InvalidTransition { from, to });
    }
    if to == Status::Available && matches!(from, Status::Acquired | Status::Failed) {
        tx.delete_associations(id).await?;
    }

    spans::record_transition(&span, id, from, to);
    metrics::status_transitions().add(
        1,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
    require_element(tx, id).await
}
