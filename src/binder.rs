//! Element-to-subscription bindings.
//!
//! Bindings may change only while an element is `Available` or
//! `Negotiating`; acquisition fixes them to the acquiring subscription.
//! Nothing here edits the associations of an acquired element.

use chrono::Utc;
use tracing::debug;

use crate::db::{Db, Transaction, Tx};
use crate::error::{Error, Result};
use crate::model::{ElementId, Subscription, SubscriptionId};
use crate::store::require_element;
use crate::validate;

#[derive(Clone)]
pub struct SubscriptionBinder {
    db: Db,
}

impl SubscriptionBinder {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Subscription `name`, created if it does not exist yet.
    pub async fn create(&self, name: &str) -> Result<Subscription> {
        validate::identifier(name)?;
        let mut tx = self.db.begin().await?;
        let result = async {
            if let Some(created) = tx.insert_subscription(name, Utc::now()).await? {
                debug!(subscription = %created.id, name, "subscription created");
                return Ok(created);
            }
            tx.subscription_by_name(name)
                .await?
                .ok_or_else(|| Error::Integrity(format!("subscription {name} vanished during insert")))
        }
        .await;
        tx.finish(result).await
    }

    pub async fn by_name(&self, name: &str) -> Result<Option<Subscription>> {
        validate::identifier(name)?;
        let mut tx = self.db.begin().await?;
        let result = tx.subscription_by_name(name).await;
        tx.finish(result).await
    }

    /// Associate `element` with `subscription`. Binding twice is a no-op.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown element or subscription, `Conflict` once the
    /// element has been acquired.
    pub async fn bind(
        &self,
        element: ElementId,
        subscription: SubscriptionId,
        within: Option<&mut Tx>,
    ) -> Result<()> {
        let mut scope = self.db.scope(within).await?;
        let result = async {
            let tx = scope.tx();
            require_subscription(tx, subscription).await?;
            // Status check and row lock in one statement.
            if !tx.hold_bindable(element, Utc::now()).await? {
                let current = require_element(tx, element).await?;
                return Err(Error::Conflict(format!(
                    "element {element} is {}; bindings are fixed",
                    current.status
                )));
            }
            tx.insert_association(element, subscription).await?;
            debug!(element = %element, subscription = %subscription, "bound");
            Ok(())
        }
        .await;
        scope.finish(result).await
    }

    /// Remove the association between `element` and `subscription`.
    /// Returns whether one existed.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the element is `Available`.
    pub async fn unbind(
        &self,
        element: ElementId,
        subscription: SubscriptionId,
        within: Option<&mut Tx>,
    ) -> Result<bool> {
        let mut scope = self.db.scope(within).await?;
        let result = async {
            let tx = scope.tx();
            if !tx.hold_available(element, Utc::now()).await? {
                let current = require_element(tx, element).await?;
                return Err(Error::Conflict(format!(
                    "element {element} is {}; only Available elements can be unbound",
                    current.status
                )));
            }
            tx.delete_association(element, subscription).await
        }
        .await;
        scope.finish(result).await
    }

    /// Subscriptions bound to `element`, by name.
    pub async fn subscriptions_for(
        &self,
        element: ElementId,
        within: Option<&mut Tx>,
    ) -> Result<Vec<Subscription>> {
        let mut scope = self.db.scope(within).await?;
        let result = async {
            let tx = scope.tx();
            require_element(tx, element).await?;
            tx.subscriptions_for(element).await
        }
        .await;
        scope.finish(result).await
    }
}

pub(crate) async fn require_subscription(
    tx: &mut dyn Transaction,
    id: SubscriptionId,
) -> Result<Subscription> {
    tx.subscription(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("subscription {id}")))
}
