//! Engine-level lifecycle properties, exercised through a real queue.

use crate::fixtures::*;
use opkit::tasks::location::UserLocationTask;
use opkit::tasks::service::{AuthorizationLevel, LocationUpdate};
use opkit::{
    BlockObserver, BlockTask, ExclusivityLedger, Operation, OperationError, OperationQueue,
    Outcome, QueueConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

fn queue() -> (OperationQueue, mpsc::Receiver<opkit::QueueEvent>) {
    OperationQueue::new(QueueConfig::default()).unwrap()
}

#[tokio::test]
async fn finish_fires_observers_exactly_once_even_when_body_finishes_twice() {
    let (queue, _events) = queue();

    let finishes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finishes);
    let op = BlockTask::operation("double-finisher", |op| {
        op.finish(vec![OperationError::service("first")]);
        op.finish(vec![OperationError::service("second")]);
    });
    op.add_observer(Arc::new(BlockObserver::new().on_finish(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    })))
    .unwrap();

    queue.add(Arc::clone(&op)).unwrap();
    op.wait_finished().await;

    assert_eq!(finishes.load(Ordering::SeqCst), 1);
    assert_eq!(op.errors(), vec![OperationError::service("first")]);
}

#[tokio::test]
async fn cancelled_before_start_reaches_finished_with_observers() {
    let (queue, _events) = queue();

    let starts = Arc::new(AtomicUsize::new(0));
    let finishes = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&starts);
    let f = Arc::clone(&finishes);

    let op = BlockTask::operation("never-runs", |_| unreachable!("cancelled before start"));
    op.add_observer(Arc::new(
        BlockObserver::new()
            .on_start(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on_finish(move |_, _| {
                f.fetch_add(1, Ordering::SeqCst);
            }),
    ))
    .unwrap();

    op.cancel();
    queue.add(Arc::clone(&op)).unwrap();
    op.wait_finished().await;

    assert_eq!(op.outcome(), Some(Outcome::Cancelled));
    assert_eq!(starts.load(Ordering::SeqCst), 0);
    assert_eq!(finishes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exclusive_location_tasks_are_serialized() {
    let (queue, _events) = queue();
    let ledger = Arc::new(ExclusivityLedger::new());
    let authorization =
        PromptingAuthorization::new(AuthorizationLevel::WhenInUse, AuthorizationLevel::WhenInUse);
    let service = ScriptedLocationService::new();

    let mut ops: Vec<Arc<Operation>> = Vec::new();
    for _ in 0..2 {
        let task = UserLocationTask::new(
            10.0,
            service.clone(),
            Arc::new(InlineDispatcher),
            |_| {},
        );
        let op = task
            .operation(authorization.clone(), Arc::clone(&ledger))
            .unwrap();
        queue.add(Arc::clone(&op)).unwrap();
        ops.push(op);
    }

    // Exactly one task may hold the hardware at a time: the second start can
    // only happen after the first task stopped and finished.
    service.wait_started().await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(service.starts.load(Ordering::SeqCst), 1);
    service.send(LocationUpdate::Reading(
        opkit::tasks::service::Location::new(59.0, 18.0, 5.0),
    ));

    for _ in 0..500 {
        if service.starts.load(Ordering::SeqCst) == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    assert_eq!(service.starts.load(Ordering::SeqCst), 2);

    service.send(LocationUpdate::Reading(
        opkit::tasks::service::Location::new(59.0, 18.0, 5.0),
    ));
    for op in &ops {
        op.wait_finished().await;
    }
    assert!(!ledger.is_held(opkit::tasks::location::LOCATION_CATEGORY));
    assert_eq!(service.stops.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn produced_operations_inherit_the_queue() {
    let (queue, _events) = queue();

    let child_ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&child_ran);
    let child = BlockTask::operation("produced-child", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let handle = Arc::clone(&child);

    let parent = BlockTask::operation("producer", move |op| {
        op.produce(Arc::clone(&handle)).unwrap();
    });
    queue.add(parent).unwrap();

    child.wait_finished().await;
    assert_eq!(child_ran.load(Ordering::SeqCst), 1);
}
