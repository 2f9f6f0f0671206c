//! Backend-agnostic persistence contract.
//!
//! Every logical operation the engine needs is a method on [`Transaction`].
//! Each storage engine implements the trait once; the SQL text for an
//! operation lives in [`super::statements`] and is shared wherever dialects
//! agree. Callers never see key generation, placeholder syntax, or DDL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{BlockId, Element, ElementId, Status, Subscription, SubscriptionId};

/// SQL dialect of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Column values for a freshly inserted element.
#[derive(Debug, Clone)]
pub struct ElementInsert<'a> {
    pub spec_name: &'a str,
    pub status: Status,
    pub priority: i64,
    pub block_id: Option<BlockId>,
    pub number_of_jobs: i64,
    pub now: DateTime<Utc>,
}

/// A storage engine: connection management and schema lifecycle.
#[async_trait]
pub trait Backend: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Start a transaction. Dropping it without commit rolls back.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Create or upgrade the schema.
    async fn migrate(&self) -> Result<()>;

    /// Drop every table (and sequence) the schema owns, dependents first.
    async fn destroy(&self) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

/// One open transaction against a backend.
///
/// Methods return `bool` where the statement is conditional: `false` means
/// zero rows matched, which callers interpret (lost race, missing row).
#[async_trait]
pub trait Transaction: Send {
    // ----- elements --------------------------------------------------------

    /// "insert element"
    async fn insert_element(&mut self, new: &ElementInsert<'_>) -> Result<ElementId>;

    /// "select element by id"
    async fn element(&mut self, id: ElementId) -> Result<Option<Element>>;

    /// "select elements by spec", oldest first.
    async fn elements_by_spec(&mut self, spec_name: &str) -> Result<Vec<Element>>;

    /// "select elements by status", priority descending then FIFO.
    async fn elements_by_status(&mut self, status: Status) -> Result<Vec<Element>>;

    /// "select acquirable": `Available`, priority at least `min_priority`,
    /// unbound or bound to `subscription`; priority descending then FIFO.
    async fn acquirable_elements(
        &mut self,
        subscription: SubscriptionId,
        min_priority: i64,
        limit: i64,
    ) -> Result<Vec<Element>>;

    /// "select stale": elements in `status` not updated since `before`.
    async fn stale_elements(
        &mut self,
        status: Status,
        before: DateTime<Utc>,
    ) -> Result<Vec<Element>>;

    /// "spec exists"
    async fn spec_exists(&mut self, spec_name: &str) -> Result<bool>;

    /// "swap status": compare-and-swap on the status column.
    async fn swap_status(
        &mut self,
        id: ElementId,
        from: Status,
        to: Status,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// "record failure": `Running -> Failed` with `retry_count + 1`.
    async fn record_failure(&mut self, id: ElementId, now: DateTime<Utc>) -> Result<bool>;

    /// "update priority"
    async fn update_priority(
        &mut self,
        id: ElementId,
        priority: i64,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// "delete element"
    async fn delete_element(&mut self, id: ElementId) -> Result<bool>;

    /// "purge settled": removes settled elements (and their associations)
    /// not updated since `before`. Returns the number of elements removed.
    async fn purge_settled(&mut self, before: DateTime<Utc>) -> Result<u64>;

    // ----- blocks ----------------------------------------------------------

    /// "select block id by name"
    async fn block_id(&mut self, name: &str) -> Result<Option<BlockId>>;

    /// "insert block"; `None` when the name already exists.
    async fn insert_block(&mut self, name: &str) -> Result<Option<BlockId>>;

    /// "add parentage"; a duplicate edge is ignored.
    async fn insert_parentage(&mut self, child: BlockId, parent: BlockId) -> Result<()>;

    /// "select parents" by child name.
    async fn parent_names(&mut self, child: &str) -> Result<Vec<String>>;

    /// "select children" by parent name.
    async fn child_names(&mut self, parent: &str) -> Result<Vec<String>>;

    /// "select parentage": all edges as `(child, parent)` names.
    async fn parentage_edges(&mut self) -> Result<Vec<(String, String)>>;

    // ----- subscriptions ---------------------------------------------------

    /// "insert subscription"; `None` when the name already exists.
    async fn insert_subscription(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>>;

    /// "select subscription by name"
    async fn subscription_by_name(&mut self, name: &str) -> Result<Option<Subscription>>;

    /// "select subscription by id"
    async fn subscription(&mut self, id: SubscriptionId) -> Result<Option<Subscription>>;

    /// "hold bindable": touches the element only while bindings may still
    /// change, locking the row against a concurrent acquisition.
    async fn hold_bindable(&mut self, id: ElementId, now: DateTime<Utc>) -> Result<bool>;

    /// "hold available": as `hold_bindable`, restricted to `Available`.
    async fn hold_available(&mut self, id: ElementId, now: DateTime<Utc>) -> Result<bool>;

    /// "insert association"; a duplicate is ignored.
    async fn insert_association(
        &mut self,
        element: ElementId,
        subscription: SubscriptionId,
    ) -> Result<()>;

    /// "delete association"
    async fn delete_association(
        &mut self,
        element: ElementId,
        subscription: SubscriptionId,
    ) -> Result<bool>;

    /// "retain association": drops every association of `element` except
    /// the one to `keep`.
    async fn retain_association(
        &mut self,
        element: ElementId,
        keep: SubscriptionId,
    ) -> Result<u64>;

    /// "delete associations" of one element.
    async fn delete_associations(&mut self, element: ElementId) -> Result<u64>;

    /// "select subscriptions for element", ordered by name.
    async fn subscriptions_for(&mut self, element: ElementId) -> Result<Vec<Subscription>>;

    // ----- completion ------------------------------------------------------

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
