//! Progress, completion and failure reports, cancellation and priority
//! changes for individual elements.

use tracing::{info, warn};

use crate::config::QueuePolicy;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{Element, ElementId, Status};
use crate::store::{ElementStore, require_element, transition_on};

#[derive(Clone)]
pub struct Mutator {
    db: Db,
    store: ElementStore,
    policy: QueuePolicy,
}

impl Mutator {
    pub fn new(db: Db, policy: QueuePolicy) -> Self {
        Self {
            store: ElementStore::new(db.clone(), policy),
            db,
            policy,
        }
    }

    /// The acquiring agent started work: `Acquired -> Running`.
    pub async fn report_progress(&self, id: ElementId) -> Result<Element> {
        self.step(id, Status::Acquired, Status::Running).await
    }

    /// `Running -> Done`.
    pub async fn report_done(&self, id: ElementId) -> Result<Element> {
        self.step(id, Status::Running, Status::Done).await
    }

    /// Record a failed run. The element returns to `Available` while its
    /// failure count stays within `max_retries`, otherwise it remains
    /// `Failed` for good.
    pub async fn report_failure(&self, id: ElementId) -> Result<Element> {
        let max_retries = self.policy.max_retries;
        let mut tx = self.db.begin().await?;
        let result = async {
            let failed = transition_on(&mut *tx, id, Status::Failed, max_retries).await?;
            if failed.retry_count <= i64::from(max_retries) {
                info!(element = %id, retry = failed.retry_count, "failure recorded, element requeued");
                transition_on(&mut *tx, id, Status::Available, max_retries).await
            } else {
                warn!(element = %id, failures = failed.retry_count, "retry budget spent");
                Ok(failed)
            }
        }
        .await;
        tx.finish(result).await
    }

    /// The agent gave the element back before starting: `Acquired -> Available`.
    pub async fn decline(&self, id: ElementId) -> Result<Element> {
        self.step(id, Status::Acquired, Status::Available).await
    }

    /// Negotiation fell through: `Negotiating -> Available`.
    pub async fn abandon(&self, id: ElementId) -> Result<Element> {
        self.step(id, Status::Negotiating, Status::Available).await
    }

    /// Withdraw an element that is `Available` or `Running`.
    pub async fn cancel(&self, id: ElementId) -> Result<Element> {
        let element = self
            .store
            .update_status(id, Status::Canceled, None)
            .await?;
        info!(element = %id, "element canceled");
        Ok(element)
    }

    pub async fn set_priority(&self, id: ElementId, priority: i64) -> Result<Element> {
        self.store.update_priority(id, priority, None).await
    }

    /// Transition only if the element is currently in `from`.
    async fn step(&self, id: ElementId, from: Status, to: Status) -> Result<Element> {
        let max_retries = self.policy.max_retries;
        let mut tx = self.db.begin().await?;
        let result = async {
            let current = require_element(&mut *tx, id).await?;
            if current.status != from {
                return Err(Error::InvalidTransition {
                    from: current.status,
                    to,
                });
            }
            transition_on(&mut *tx, id, to, max_retries).await
        }
        .await;
        tx.finish(result).await
    }
}
