use std::collections::HashSet;

use workqueue::config::QueuePolicy;
use workqueue::db::Db;
use workqueue::engine::WorkQueue;
use workqueue::error::Error;
use workqueue::model::{ElementId, NewElement, Status, SubscriptionId};

async fn test_queue() -> WorkQueue {
    WorkQueue::new(Db::in_memory().await.unwrap(), QueuePolicy::new(3))
}

fn ids(elements: &[workqueue::model::Element]) -> Vec<ElementId> {
    elements.iter().map(|e| e.id).collect()
}

#[tokio::test]
async fn acquire_claims_once() {
    let queue = test_queue().await;
    let sub = queue.binder().create("agents").await.unwrap();
    let e = queue
        .store()
        .insert(NewElement::new("spec").priority(5), None)
        .await
        .unwrap();

    let first = queue.acquire(sub.id, 1, 0).await.unwrap();
    assert_eq!(ids(&first), vec![e]);
    assert_eq!(first[0].status, Status::Acquired);
    assert_eq!(queue.store().get(e, None).await.unwrap().status, Status::Acquired);

    let second = queue.acquire(sub.id, 1, 0).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn acquire_respects_order_and_bound() {
    let queue = test_queue().await;
    let sub = queue.binder().create("agents").await.unwrap();
    let store = queue.store();
    let low = store.insert(NewElement::new("spec").priority(1), None).await.unwrap();
    let high = store.insert(NewElement::new("spec").priority(9), None).await.unwrap();
    let mid_a = store.insert(NewElement::new("spec").priority(4), None).await.unwrap();
    let mid_b = store.insert(NewElement::new("spec").priority(4), None).await.unwrap();

    let batch = queue.acquire(sub.id, 3, 0).await.unwrap();
    assert_eq!(ids(&batch), vec![high, mid_a, mid_b]);

    let rest = queue.acquire(sub.id, 3, 0).await.unwrap();
    assert_eq!(ids(&rest), vec![low]);
}

#[tokio::test]
async fn min_priority_filters_candidates() {
    let queue = test_queue().await;
    let sub = queue.binder().create("agents").await.unwrap();
    let store = queue.store();
    store.insert(NewElement::new("spec").priority(2), None).await.unwrap();
    let urgent = store.insert(NewElement::new("spec").priority(8), None).await.unwrap();

    let batch = queue.acquire(sub.id, 10, 5).await.unwrap();
    assert_eq!(ids(&batch), vec![urgent]);
}

#[tokio::test]
async fn zero_max_and_empty_backlog_return_nothing() {
    let queue = test_queue().await;
    let sub = queue.binder().create("agents").await.unwrap();
    assert!(queue.acquire(sub.id, 5, 0).await.unwrap().is_empty());

    queue.store().insert(NewElement::new("spec"), None).await.unwrap();
    assert!(queue.acquire(sub.id, 0, 0).await.unwrap().is_empty());
    assert_eq!(
        queue.store().list_by_status(Status::Available, None).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn unknown_subscription_is_not_found() {
    let queue = test_queue().await;
    queue.store().insert(NewElement::new("spec"), None).await.unwrap();
    let err = queue.acquire(SubscriptionId(77), 1, 0).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    assert_eq!(
        queue.store().list_by_status(Status::Available, None).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn elements_bound_elsewhere_are_skipped() {
    let queue = test_queue().await;
    let mine = queue.binder().create("mine").await.unwrap();
    let theirs = queue.binder().create("theirs").await.unwrap();
    let store = queue.store();

    let reserved = store.insert(NewElement::new("spec").priority(9), None).await.unwrap();
    let open = store.insert(NewElement::new("spec").priority(1), None).await.unwrap();
    queue.binder().bind(reserved, theirs.id, None).await.unwrap();

    let batch = queue.acquire(mine.id, 5, 0).await.unwrap();
    assert_eq!(ids(&batch), vec![open]);

    let batch = queue.acquire(theirs.id, 5, 0).await.unwrap();
    assert_eq!(ids(&batch), vec![reserved]);
}

#[tokio::test]
async fn acquisition_fixes_binding_to_acquirer() {
    let queue = test_queue().await;
    let a = queue.binder().create("team-a").await.unwrap();
    let b = queue.binder().create("team-b").await.unwrap();
    let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();
    queue.binder().bind(id, a.id, None).await.unwrap();
    queue.binder().bind(id, b.id, None).await.unwrap();

    let batch = queue.acquire(b.id, 1, 0).await.unwrap();
    assert_eq!(ids(&batch), vec![id]);
    assert_eq!(queue.binder().subscriptions_for(id, None).await.unwrap(), vec![b]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquisitions_are_disjoint() {
    let queue = test_queue().await;
    for n in 0..40 {
        queue
            .store()
            .insert(NewElement::new("spec").priority(n % 4), None)
            .await
            .unwrap();
    }
    let mut subs = Vec::new();
    for name in ["w1", "w2", "w3", "w4"] {
        subs.push(queue.binder().create(name).await.unwrap().id);
    }

    let mut handles = Vec::new();
    for sub in subs {
        for _ in 0..3 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move { queue.acquire(sub, 4, 0).await }));
        }
    }

    let mut claimed = HashSet::new();
    let mut total = 0;
    for handle in handles {
        let batch = handle.await.unwrap().unwrap();
        total += batch.len();
        for element in batch {
            assert!(claimed.insert(element.id), "{} acquired twice", element.id);
        }
    }
    assert_eq!(total, 40);
    assert!(queue
        .store()
        .list_by_status(Status::Available, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn acquisitions_across_handles_on_one_file_are_disjoint() {
    let path = std::env::temp_dir().join(format!("workqueue-{}.db", uuid::Uuid::new_v4().simple()));
    let url = format!("sqlite:{}", path.display());
    let first = Db::connect(&url).await.unwrap();
    first.migrate().await.unwrap();
    let second = Db::connect(&url).await.unwrap();
    let queues = [
        WorkQueue::new(first, QueuePolicy::new(3)),
        WorkQueue::new(second, QueuePolicy::new(3)),
    ];

    let sub = queues[0].binder().create("agents").await.unwrap();
    let mut tx = queues[0].db().begin().await.unwrap();
    for n in 0..100 {
        queues[0]
            .store()
            .insert(NewElement::new("spec").priority(n % 5), Some(&mut tx))
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // Twice as much demand as supply, split across both handles.
    let mut handles = Vec::new();
    for n in 0..40 {
        let queue = queues[n % 2].clone();
        handles.push(tokio::spawn(async move { queue.acquire(sub.id, 5, 0).await }));
    }

    let mut claimed = HashSet::new();
    for handle in handles {
        let batch = handle
            .await
            .unwrap()
            .unwrap_or_else(|err| panic!("contended acquire failed: {err}"));
        for element in batch {
            assert!(claimed.insert(element.id), "{} acquired twice", element.id);
        }
    }
    assert_eq!(claimed.len(), 100);
    assert!(queues[1]
        .store()
        .list_by_status(Status::Available, None)
        .await
        .unwrap()
        .is_empty());

    drop(queues);
    for suffix in ["", "-wal", "-shm"] {
        std::fs::remove_file(format!("{}{suffix}", path.display())).ok();
    }
}
