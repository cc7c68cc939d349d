//! ReverseGeocodeTask driven end to end through a queue, bookkeeping
//! observers attached.

use crate::fixtures::*;
use opkit::tasks::geocode::ReverseGeocodeTask;
use opkit::tasks::service::{GeocodeReply, Location, Placemark};
use opkit::{OperationQueue, Outcome, QueueConfig};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn place(name: &str) -> Placemark {
    Placemark {
        name: name.to_string(),
        locality: Some("Stockholm".to_string()),
        country: Some("Sweden".to_string()),
    }
}

#[tokio::test]
async fn successful_lookup_records_first_candidate_and_balances_bookkeeping() {
    let (queue, _events) = OperationQueue::new(QueueConfig::default()).unwrap();
    let geocoder = ScriptedGeocoder::new();
    let books = Arc::new(Bookkeeper::default());

    let task = ReverseGeocodeTask::new(Location::new(59.33, 18.06, 8.0), geocoder.clone());
    let op = task.operation(books.clone(), books.clone()).unwrap();
    queue.add(Arc::clone(&op)).unwrap();

    geocoder.wait_issued().await;
    // Indicator shown and background task begun while the lookup is out.
    assert_eq!(books.balance.load(Ordering::SeqCst), 2);

    geocoder.reply(GeocodeReply {
        placemarks: vec![place("Gamla stan"), place("Norrmalm")],
        error: None,
    });

    op.wait_finished().await;
    assert_eq!(op.outcome(), Some(Outcome::Success));
    assert_eq!(task.placemark().unwrap().name, "Gamla stan");
    assert_eq!(books.balance.load(Ordering::SeqCst), 0);
    assert_eq!(books.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_lookup_surfaces_service_error() {
    let (queue, _events) = OperationQueue::new(QueueConfig::default()).unwrap();
    let geocoder = ScriptedGeocoder::new();
    let books = Arc::new(Bookkeeper::default());

    let task = ReverseGeocodeTask::new(Location::new(0.0, 0.0, 8.0), geocoder.clone());
    let op = task.operation(books.clone(), books.clone()).unwrap();
    queue.add(Arc::clone(&op)).unwrap();

    geocoder.wait_issued().await;
    geocoder.reply(GeocodeReply {
        placemarks: Vec::new(),
        error: Some("no route to host".to_string()),
    });

    op.wait_finished().await;
    assert!(matches!(op.outcome(), Some(Outcome::Failed { .. })));
    assert!(task.placemark().is_none());
    assert_eq!(books.balance.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn late_callback_after_cancel_changes_nothing() {
    let (queue, _events) = OperationQueue::new(QueueConfig::default()).unwrap();
    let geocoder = ScriptedGeocoder::new();
    let books = Arc::new(Bookkeeper::default());

    let task = ReverseGeocodeTask::new(Location::new(1.0, 2.0, 8.0), geocoder.clone());
    let op = task.operation(books.clone(), books.clone()).unwrap();
    queue.add(Arc::clone(&op)).unwrap();

    geocoder.wait_issued().await;
    op.cancel();
    op.wait_finished().await;

    assert_eq!(op.outcome(), Some(Outcome::Cancelled));
    assert_eq!(geocoder.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(books.balance.load(Ordering::SeqCst), 0);

    // The service answers anyway, after the fact.
    geocoder.reply(GeocodeReply {
        placemarks: vec![place("Too late")],
        error: None,
    });
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    assert_eq!(op.outcome(), Some(Outcome::Cancelled));
    assert!(task.placemark().is_none());
    assert_eq!(books.balance.load(Ordering::SeqCst), 0);
}
