//! Row types shared by the sqlx backends, and the `Transaction` impl they
//! have in common.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Element, ElementId, Subscription, SubscriptionId};

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
pub(crate) struct ElementRow {
    id: i64,
    spec_name: String,
    status: String,
    priority: i64,
    block_name: Option<String>,
    number_of_jobs: i64,
    retry_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ElementRow {
    pub(crate) fn try_into_element(self) -> Result<Element> {
        Ok(Element {
            id: ElementId(self.id),
            spec_name: self.spec_name,
            status: self.status.parse()?,
            priority: self.priority,
            block_name: self.block_name,
            number_of_jobs: self.number_of_jobs,
            retry_count: self.retry_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: SubscriptionId(row.id),
            name: row.name,
            created_at: row.created_at,
        }
    }
}

pub(crate) fn into_elements(rows: Vec<ElementRow>) -> Result<Vec<Element>> {
    rows.into_iter().map(ElementRow::try_into_element).collect()
}

/// Implements [`crate::db::port::Transaction`] for a struct holding
/// `tx: sqlx::Transaction<'static, DB>`.
///
/// The method bodies are identical for every sqlx driver because the
/// statements are; only the executor type changes.
macro_rules! sqlx_transaction {
    ($name:ident) => {
        #[async_trait::async_trait]
        impl $crate::db::port::Transaction for $name {
            async fn insert_element(
                &mut self,
                new: &$crate::db::port::ElementInsert<'_>,
            ) -> $crate::error::Result<$crate::model::ElementId> {
                let (id,): (i64,) = sqlx::query_as($crate::db::statements::INSERT_ELEMENT)
                    .bind(new.spec_name)
                    .bind(new.status.as_str())
                    .bind(new.priority)
                    .bind(new.block_id.map(|b| b.0))
                    .bind(new.number_of_jobs)
                    .bind(new.now)
                    .fetch_one(&mut *self.tx)
                    .await?;
                Ok($crate::model::ElementId(id))
            }

            async fn element(
                &mut self,
                id: $crate::model::ElementId,
            ) -> $crate::error::Result<Option<$crate::model::Element>> {
                let row: Option<$crate::db::rows::ElementRow> =
                    sqlx::query_as($crate::db::statements::ELEMENT_BY_ID)
                        .bind(id.0)
                        .fetch_optional(&mut *self.tx)
                        .await?;
                row.map($crate::db::rows::ElementRow::try_into_element)
                    .transpose()
            }

            async fn elements_by_spec(
                &mut self,
                spec_name: &str,
            ) -> $crate::error::Result<Vec<$crate::model::Element>> {
                let rows: Vec<$crate::db::rows::ElementRow> =
                    sqlx::query_as($crate::db::statements::ELEMENTS_BY_SPEC)
                        .bind(spec_name)
                        .fetch_all(&mut *self.tx)
                        .await?;
                $crate::db::rows::into_elements(rows)
            }

            async fn elements_by_status(
                &mut self,
                status: $crate::model::Status,
            ) -> $crate::error::Result<Vec<$crate::model::Element>> {
                let rows: Vec<$crate::db::rows::ElementRow> =
                    sqlx::query_as($crate::db::statements::ELEMENTS_BY_STATUS)
                        .bind(status.as_str())
                        .fetch_all(&mut *self.tx)
                        .await?;
                $crate::db::rows::into_elements(rows)
            }

            async fn acquirable_elements(
                &mut self,
                subscription: $crate::model::SubscriptionId,
                min_priority: i64,
                limit: i64,
            ) -> $crate::error::Result<Vec<$crate::model::Element>> {
                let rows: Vec<$crate::db::rows::ElementRow> =
                    sqlx::query_as($crate::db::statements::ACQUIRABLE_ELEMENTS)
                        .bind(min_priority)
                        .bind(subscription.0)
                        .bind(limit)
                        .fetch_all(&mut *self.tx)
                        .await?;
                $crate::db::rows::into_elements(rows)
            }

            async fn stale_elements(
                &mut self,
                status: $crate::model::Status,
                before: chrono::DateTime<chrono::Utc>,
            ) -> $crate::error::Result<Vec<$crate::model::Element>> {
                let rows: Vec<$crate::db::rows::ElementRow> =
                    sqlx::query_as($crate::db::statements::STALE_ELEMENTS)
                        .bind(status.as_str())
                        .bind(before)
                        .fetch_all(&mut *self.tx)
                        .await?;
                $crate::db::rows::into_elements(rows)
            }

            async fn spec_exists(&mut self, spec_name: &str) -> $crate::error::Result<bool> {
                let row: Option<(i64,)> = sqlx::query_as($crate::db::statements::SPEC_EXISTS)
                    .bind(spec_name)
                    .fetch_optional(&mut *self.tx)
                    .await?;
                Ok(row.is_some())
            }

            async fn swap_status(
                &mut self,
                id: $crate::model::ElementId,
                from: $crate::model::Status,
                to: $crate::model::Status,
                now: chrono::DateTime<chrono::Utc>,
            ) -> $crate::error::Result<bool> {
                let rows_affected = sqlx::query($crate::db::statements::SWAP_STATUS)
                    .bind(to.as_str())
                    .bind(now)
                    .bind(id.0)
                    .bind(from.as_str())
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected > 0)
            }

            async fn record_failure(
                &mut self,
                id: $crate::model::ElementId,
                now: chrono::DateTime<chrono::Utc>,
            ) -> $crate::error::Result<bool> {
                let rows_affected = sqlx::query($crate::db::statements::RECORD_FAILURE)
                    .bind(now)
                    .bind(id.0)
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected > 0)
            }

            async fn update_priority(
                &mut self,
                id: $crate::model::ElementId,
                priority: i64,
                now: chrono::DateTime<chrono::Utc>,
            ) -> $crate::error::Result<bool> {
                let rows_affected = sqlx::query($crate::db::statements::UPDATE_PRIORITY)
                    .bind(priority)
                    .bind(now)
                    .bind(id.0)
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected > 0)
            }

            async fn delete_element(
                &mut self,
                id: $crate::model::ElementId,
            ) -> $crate::error::Result<bool> {
                let rows_affected = sqlx::query($crate::db::statements::DELETE_ELEMENT)
                    .bind(id.0)
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected > 0)
            }

            async fn purge_settled(
                &mut self,
                before: chrono::DateTime<chrono::Utc>,
            ) -> $crate::error::Result<u64> {
                sqlx::query($crate::db::statements::PURGE_SETTLED_ASSOCIATIONS)
                    .bind(before)
                    .execute(&mut *self.tx)
                    .await?;
                let rows_affected = sqlx::query($crate::db::statements::PURGE_SETTLED_ELEMENTS)
                    .bind(before)
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected)
            }

            async fn block_id(
                &mut self,
                name: &str,
            ) -> $crate::error::Result<Option<$crate::model::BlockId>> {
                let row: Option<(i64,)> = sqlx::query_as($crate::db::statements::BLOCK_ID)
                    .bind(name)
                    .fetch_optional(&mut *self.tx)
                    .await?;
                Ok(row.map(|(id,)| $crate::model::BlockId(id)))
            }

            async fn insert_block(
                &mut self,
                name: &str,
            ) -> $crate::error::Result<Option<$crate::model::BlockId>> {
                let row: Option<(i64,)> = sqlx::query_as($crate::db::statements::INSERT_BLOCK)
                    .bind(name)
                    .fetch_optional(&mut *self.tx)
                    .await?;
                Ok(row.map(|(id,)| $crate::model::BlockId(id)))
            }

            async fn insert_parentage(
                &mut self,
                child: $crate::model::BlockId,
                parent: $crate::model::BlockId,
            ) -> $crate::error::Result<()> {
                sqlx::query($crate::db::statements::INSERT_PARENTAGE)
                    .bind(child.0)
                    .bind(parent.0)
                    .execute(&mut *self.tx)
                    .await?;
                Ok(())
            }

            async fn parent_names(&mut self, child: &str) -> $crate::error::Result<Vec<String>> {
                let rows: Vec<(String,)> = sqlx::query_as($crate::db::statements::PARENT_NAMES)
                    .bind(child)
                    .fetch_all(&mut *self.tx)
                    .await?;
                Ok(rows.into_iter().map(|(name,)| name).collect())
            }

            async fn child_names(&mut self, parent: &str) -> $crate::error::Result<Vec<String>> {
                let rows: Vec<(String,)> = sqlx::query_as($crate::db::statements::CHILD_NAMES)
                    .bind(parent)
                    .fetch_all(&mut *self.tx)
                    .await?;
                Ok(rows.into_iter().map(|(name,)| name).collect())
            }

            async fn parentage_edges(&mut self) -> $crate::error::Result<Vec<(String, String)>> {
                let rows: Vec<(String, String)> =
                    sqlx::query_as($crate::db::statements::PARENTAGE_EDGES)
                        .fetch_all(&mut *self.tx)
                        .await?;
                Ok(rows)
            }

            async fn insert_subscription(
                &mut self,
                name: &str,
                now: chrono::DateTime<chrono::Utc>,
            ) -> $crate::error::Result<Option<$crate::model::Subscription>> {
                let row: Option<$crate::db::rows::SubscriptionRow> =
                    sqlx::query_as($crate::db::statements::INSERT_SUBSCRIPTION)
                        .bind(name)
                        .bind(now)
                        .fetch_optional(&mut *self.tx)
                        .await?;
                Ok(row.map(Into::into))
            }

            async fn subscription_by_name(
                &mut self,
                name: &str,
            ) -> $crate::error::Result<Option<$crate::model::Subscription>> {
                let row: Option<$crate::db::rows::SubscriptionRow> =
                    sqlx::query_as($crate::db::statements::SUBSCRIPTION_BY_NAME)
                        .bind(name)
                        .fetch_optional(&mut *self.tx)
                        .await?;
                Ok(row.map(Into::into))
            }

            async fn subscription(
                &mut self,
                id: $crate::model::SubscriptionId,
            ) -> $crate::error::Result<Option<$crate::model::Subscription>> {
                let row: Option<$crate::db::rows::SubscriptionRow> =
                    sqlx::query_as($crate::db::statements::SUBSCRIPTION_BY_ID)
                        .bind(id.0)
                        .fetch_optional(&mut *self.tx)
                        .await?;
                Ok(row.map(Into::into))
            }

            async fn hold_bindable(
                &mut self,
                id: $crate::model::ElementId,
                now: chrono::DateTime<chrono::Utc>,
            ) -> $crate::error::Result<bool> {
                let rows_affected = sqlx::query($crate::db::statements::HOLD_BINDABLE)
                    .bind(now)
                    .bind(id.0)
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected > 0)
            }

            async fn hold_available(
                &mut self,
                id: $crate::model::ElementId,
                now: chrono::DateTime<chrono::Utc>,
            ) -> $crate::error::Result<bool> {
                let rows_affected = sqlx::query($crate::db::statements::HOLD_AVAILABLE)
                    .bind(now)
                    .bind(id.0)
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected > 0)
            }

            async fn insert_association(
                &mut self,
                element: $crate::model::ElementId,
                subscription: $crate::model::SubscriptionId,
            ) -> $crate::error::Result<()> {
                sqlx::query($crate::db::statements::INSERT_ASSOCIATION)
                    .bind(element.0)
                    .bind(subscription.0)
                    .execute(&mut *self.tx)
                    .await?;
                Ok(())
            }

            async fn delete_association(
                &mut self,
                element: $crate::model::ElementId,
                subscription: $crate::model::SubscriptionId,
            ) -> $crate::error::Result<bool> {
                let rows_affected = sqlx::query($crate::db::statements::DELETE_ASSOCIATION)
                    .bind(element.0)
                    .bind(subscription.0)
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected > 0)
            }

            async fn retain_association(
                &mut self,
                element: $crate::model::ElementId,
                keep: $crate::model::SubscriptionId,
            ) -> $crate::error::Result<u64> {
                let rows_affected = sqlx::query($crate::db::statements::RETAIN_ASSOCIATION)
                    .bind(element.0)
                    .bind(keep.0)
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected)
            }

            async fn delete_associations(
                &mut self,
                element: $crate::model::ElementId,
            ) -> $crate::error::Result<u64> {
                let rows_affected = sqlx::query($crate::db::statements::DELETE_ASSOCIATIONS)
                    .bind(element.0)
                    .execute(&mut *self.tx)
                    .await?
                    .rows_affected();
                Ok(rows_affected)
            }

            async fn subscriptions_for(
                &mut self,
                element: $crate::model::ElementId,
            ) -> $crate::error::Result<Vec<$crate::model::Subscription>> {
                let rows: Vec<$crate::db::rows::SubscriptionRow> =
                    sqlx::query_as($crate::db::statements::SUBSCRIPTIONS_FOR)
                        .bind(element.0)
                        .fetch_all(&mut *self.tx)
                        .await?;
                Ok(rows.into_iter().map(Into::into).collect())
            }

            async fn commit(self: Box<Self>) -> $crate::error::Result<()> {
                let this = *self;
                this.tx.commit().await?;
                Ok(())
            }

            async fn rollback(self: Box<Self>) -> $crate::error::Result<()> {
                let this = *self;
                this.tx.rollback().await?;
                Ok(())
            }
        }
    };
}

pub(crate) use sqlx_transaction;
