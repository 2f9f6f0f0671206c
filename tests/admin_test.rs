use workqueue::admin::AdminApi;
use workqueue::config::QueuePolicy;
use workqueue::db::Db;
use workqueue::engine::WorkQueue;
use workqueue::error::{Error, ErrorKind};
use workqueue::model::{NewElement, Status};

async fn test_admin() -> (AdminApi, WorkQueue) {
    let queue = WorkQueue::new(Db::in_memory().await.unwrap(), QueuePolicy::new(1));
    (AdminApi::new(queue.clone()), queue)
}

#[tokio::test]
async fn malformed_identifiers_are_client_errors() {
    let (admin, _queue) = test_admin().await;

    let errors = [
        admin.list_by_status("Paused").await.unwrap_err(),
        admin.elements_for_spec("x' OR 1=1 --").await.unwrap_err(),
        admin.subscriptions_for("12abc").await.unwrap_err(),
        admin.subscriptions_for("-4").await.unwrap_err(),
        admin.set_priority("1", "high").await.unwrap_err(),
        admin.set_status("1", "Finished").await.unwrap_err(),
    ];
    for err in errors {
        assert!(matches!(err, Error::InvalidInput(_)), "{err}");
        assert_eq!(err.kind(), ErrorKind::Client);
    }
}

#[tokio::test]
async fn text_operations_reach_the_store() {
    let (admin, queue) = test_admin().await;
    let id = queue
        .store()
        .insert(NewElement::new("spec-7"), None)
        .await
        .unwrap();
    let id_text = id.to_string();

    let listed = admin.list_by_status("available").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(admin.elements_for_spec("spec-7").await.unwrap()[0].id, id);

    let element = admin.set_priority(&id_text, " 9 ").await.unwrap();
    assert_eq!(element.priority, 9);

    let element = admin.set_status(&id_text, "Canceled").await.unwrap();
    assert_eq!(element.status, Status::Canceled);
    assert!(admin.subscriptions_for(&id_text).await.unwrap().is_empty());
}

#[tokio::test]
async fn illegal_status_is_reported_not_applied() {
    let (admin, queue) = test_admin().await;
    let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();

    let err = admin.set_status(&id.to_string(), "Done").await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }), "{err}");
    assert_eq!(queue.store().get(id, None).await.unwrap().status, Status::Available);
}

#[tokio::test]
async fn failed_via_admin_counts_a_failure() {
    let (admin, queue) = test_admin().await;
    let sub = queue.binder().create("agents").await.unwrap();
    let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();
    queue.acquire(sub.id, 1, 0).await.unwrap();
    admin.set_status(&id.to_string(), "Running").await.unwrap();

    let element = admin.set_status(&id.to_string(), "Failed").await.unwrap();
    assert_eq!(element.retry_count, 1);
    assert_eq!(element.status, Status::Available);
}
