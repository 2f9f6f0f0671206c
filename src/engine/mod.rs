//! Queue engine: acquisition, status reports, ingestion, and the
//! [`WorkQueue`] facade tying the components to one database.

pub mod ingest;
pub mod mutator;
pub mod scheduler;

use chrono::Utc;

pub use mutator::Mutator;
pub use scheduler::Scheduler;

use crate::binder::SubscriptionBinder;
use crate::config::QueuePolicy;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::lineage::LineageTracker;
use crate::model::{Element, ElementId, ElementRequest, Status, SubscriptionId};
use crate::store::ElementStore;

/// Statuses an element holds while an agent owns it.
const IN_FLIGHT: [Status; 3] = [Status::Negotiating, Status::Acquired, Status::Running];

/// One work queue over one database.
#[derive(Clone)]
pub struct WorkQueue {
    db: Db,
    policy: QueuePolicy,
    store: ElementStore,
    lineage: LineageTracker,
    binder: SubscriptionBinder,
    scheduler: Scheduler,
    mutator: Mutator,
}

impl WorkQueue {
    pub fn new(db: Db, policy: QueuePolicy) -> Self {
        Self {
            store: ElementStore::new(db.clone(), policy),
            lineage: LineageTracker::new(db.clone()),
            binder: SubscriptionBinder::new(db.clone()),
            scheduler: Scheduler::new(db.clone()),
            mutator: Mutator::new(db.clone(), policy),
            db,
            policy,
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    pub fn lineage(&self) -> &LineageTracker {
        &self.lineage
    }

    pub fn binder(&self) -> &SubscriptionBinder {
        &self.binder
    }

    pub fn mutator(&self) -> &Mutator {
        &self.mutator
    }

    /// See [`ingest::ingest`].
    pub async fn ingest(
        &self,
        spec_name: &str,
        requests: &[ElementRequest],
    ) -> Result<Vec<ElementId>> {
        ingest::ingest(&self.db, spec_name, requests).await
    }

    /// See [`Scheduler::acquire`].
    pub async fn acquire(
        &self,
        subscription: SubscriptionId,
        max_elements: u32,
        min_priority: i64,
    ) -> Result<Vec<Element>> {
        self.scheduler
            .acquire(subscription, max_elements, min_priority)
            .await
    }

    /// In-flight elements unchanged for longer than the policy's
    /// `stale_after`, least recently updated first.
    pub async fn stuck(&self) -> Result<Vec<Element>> {
        let window = self
            .policy
            .stale_after
            .ok_or_else(|| Error::Config("stale_after is not configured".to_string()))?;
        let mut stuck = Vec::new();
        for status in IN_FLIGHT {
            stuck.extend(self.store.stale(status, window).await?);
        }
        stuck.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        Ok(stuck)
    }

    /// Purge settled elements older than the policy's `retention`.
    pub async fn purge_expired(&self) -> Result<u64> {
        let retention = self
            .policy
            .retention
            .ok_or_else(|| Error::Config("retention is not configured".to_string()))?;
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| Error::Config(format!("retention out of range: {e}")))?;
        self.store.purge_terminal(Utc::now() - retention).await
    }
}
