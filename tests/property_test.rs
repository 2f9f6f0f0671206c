use std::collections::{HashSet, VecDeque};

use proptest::prelude::*;
use workqueue::config::QueuePolicy;
use workqueue::db::Db;
use workqueue::engine::WorkQueue;
use workqueue::model::{NewElement, Status};

/// Every status reachable from `Available` along the transition table.
fn reachable_from_available() -> HashSet<Status> {
    let mut seen = HashSet::from([Status::Available]);
    let mut queue = VecDeque::from([Status::Available]);
    while let Some(from) = queue.pop_front() {
        for to in Status::ALL {
            if from.can_transition_to(to) && seen.insert(to) {
                queue.push_back(to);
            }
        }
    }
    seen
}

#[test]
fn every_status_is_reachable() {
    assert_eq!(reachable_from_available(), HashSet::from(Status::ALL));
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Acquire,
    Progress,
    Done,
    Failure,
    Decline,
    Cancel,
    Negotiate,
    Abandon,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Acquire),
        Just(Op::Progress),
        Just(Op::Done),
        Just(Op::Failure),
        Just(Op::Decline),
        Just(Op::Cancel),
        Just(Op::Negotiate),
        Just(Op::Abandon),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Whatever callers try, the stored status only moves along table edges
    // and failures never exceed the budget by more than one.
    #[test]
    fn stored_status_follows_the_table(
        max_retries in 0u32..3,
        ops in proptest::collection::vec(op_strategy(), 1..30),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let queue = WorkQueue::new(Db::in_memory().await.unwrap(), QueuePolicy::new(max_retries));
            let sub = queue.binder().create("agents").await.unwrap();
            let id = queue.store().insert(NewElement::new("spec"), None).await.unwrap();
            let mutator = queue.mutator();

            let mut before = Status::Available;
            for op in ops {
                let outcome = match op {
                    Op::Acquire => queue.acquire(sub.id, 1, 0).await.map(|_| ()),
                    Op::Progress => mutator.report_progress(id).await.map(|_| ()),
                    Op::Done => mutator.report_done(id).await.map(|_| ()),
                    Op::Failure => mutator.report_failure(id).await.map(|_| ()),
                    Op::Decline => mutator.decline(id).await.map(|_| ()),
                    Op::Cancel => mutator.cancel(id).await.map(|_| ()),
                    Op::Negotiate => queue
                        .store()
                        .update_status(id, Status::Negotiating, None)
                        .await
                        .map(|_| ()),
                    Op::Abandon => mutator.abandon(id).await.map(|_| ()),
                };
                let after = queue.store().get(id, None).await.unwrap();

                if outcome.is_err() {
                    assert_eq!(after.status, before, "{op:?} failed but changed state");
                } else if after.status != before {
                    // A failure report passes through Failed on its way back.
                    let via_failed = matches!(op, Op::Failure)
                        && before.can_transition_to(Status::Failed)
                        && Status::Failed.can_transition_to(after.status);
                    let via_negotiating = matches!(op, Op::Acquire)
                        && before == Status::Available
                        && after.status == Status::Acquired;
                    assert!(
                        before.can_transition_to(after.status) || via_failed || via_negotiating,
                        "{op:?}: {before} -> {}",
                        after.status
                    );
                }
                assert!(after.retry_count <= i64::from(max_retries) + 1);
                before = after.status;
            }
        });
    }
}
