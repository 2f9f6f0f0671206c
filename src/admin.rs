//! String-typed operations for an administrative frontend.
//!
//! Every argument arrives as text and is parsed and validated here, so a
//! malformed identifier is rejected with `InvalidInput` before the store
//! sees it.

use crate::engine::WorkQueue;
use crate::error::{Error, Result};
use crate::model::{Element, Status, Subscription};
use crate::validate;

#[derive(Clone)]
pub struct AdminApi {
    queue: WorkQueue,
}

impl AdminApi {
    pub fn new(queue: WorkQueue) -> Self {
        Self { queue }
    }

    pub async fn list_by_status(&self, status: &str) -> Result<Vec<Element>> {
        let status: Status = status.parse()?;
        self.queue.store().list_by_status(status, None).await
    }

    pub async fn elements_for_spec(&self, spec_name: &str) -> Result<Vec<Element>> {
        validate::identifier(spec_name)?;
        self.queue.store().by_spec(spec_name, None).await
    }

    pub async fn subscriptions_for(&self, element_id: &str) -> Result<Vec<Subscription>> {
        let id = validate::element_id(element_id)?;
        self.queue.binder().subscriptions_for(id, None).await
    }

    pub async fn set_priority(&self, element_id: &str, priority: &str) -> Result<Element> {
        let id = validate::element_id(element_id)?;
        let priority = priority
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::InvalidInput(format!("malformed priority: {priority:?}")))?;
        self.queue.mutator().set_priority(id, priority).await
    }

    /// Move an element to `status`. `Failed` counts as a failure report and
    /// may requeue the element.
    pub async fn set_status(&self, element_id: &str, status: &str) -> Result<Element> {
        let id = validate::element_id(element_id)?;
        let to: Status = status.parse()?;
        match to {
            Status::Failed => self.queue.mutator().report_failure(id).await,
            _ => self.queue.store().update_status(id, to, None).await,
        }
    }
}
