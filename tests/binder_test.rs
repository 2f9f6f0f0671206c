use workqueue::config::QueuePolicy;
use workqueue::db::Db;
use workqueue::engine::WorkQueue;
use workqueue::error::Error;
use workqueue::model::{ElementId, NewElement, Status, SubscriptionId};

async fn test_queue() -> WorkQueue {
    WorkQueue::new(Db::in_memory().await.unwrap(), QueuePolicy::new(1))
}

#[tokio::test]
async fn create_is_idempotent() {
    let queue = test_queue().await;
    let first = queue.binder().create("team-a").await.unwrap();
    let again = queue.binder().create("team-a").await.unwrap();
    assert_eq!(first, again);

    let found = queue.binder().by_name("team-a").await.unwrap();
    assert_eq!(found, Some(first));
    assert!(queue.binder().by_name("team-b").await.unwrap().is_none());
}

#[tokio::test]
async fn bind_before_acquisition_is_visible() {
    let queue = test_queue().await;
    let a = queue.binder().create("team-a").await.unwrap();
    let b = queue.binder().create("team-b").await.unwrap();
    let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();

    queue.binder().bind(id, b.id, None).await.unwrap();
    queue.binder().bind(id, a.id, None).await.unwrap();
    queue.binder().bind(id, a.id, None).await.unwrap();

    let bound = queue.binder().subscriptions_for(id, None).await.unwrap();
    assert_eq!(bound, vec![a, b]);
}

#[tokio::test]
async fn bind_after_acquisition_conflicts() {
    let queue = test_queue().await;
    let a = queue.binder().create("team-a").await.unwrap();
    let b = queue.binder().create("team-b").await.unwrap();
    let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();

    let acquired = queue.acquire(a.id, 1, 0).await.unwrap();
    assert_eq!(acquired[0].status, Status::Acquired);

    let err = queue.binder().bind(id, b.id, None).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err}");
    let bound = queue.binder().subscriptions_for(id, None).await.unwrap();
    assert_eq!(bound, vec![a]);
}

#[tokio::test]
async fn bind_unknown_ids_are_not_found() {
    let queue = test_queue().await;
    let sub = queue.binder().create("team-a").await.unwrap();
    let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();

    let err = queue.binder().bind(ElementId(404), sub.id, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    let err = queue
        .binder()
        .bind(id, SubscriptionId(404), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
}

#[tokio::test]
async fn unbind_only_while_available() {
    let queue = test_queue().await;
    let a = queue.binder().create("team-a").await.unwrap();
    let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();

    queue.binder().bind(id, a.id, None).await.unwrap();
    assert!(queue.binder().unbind(id, a.id, None).await.unwrap());
    assert!(!queue.binder().unbind(id, a.id, None).await.unwrap());
    assert!(queue.binder().subscriptions_for(id, None).await.unwrap().is_empty());

    queue.acquire(a.id, 1, 0).await.unwrap();
    let err = queue.binder().unbind(id, a.id, None).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err}");
}

#[tokio::test]
async fn rejected_subscription_names() {
    let queue = test_queue().await;
    let err = queue.binder().create("team a").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err}");
}
