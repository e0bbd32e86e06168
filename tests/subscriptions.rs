//! Live subscription and broadcast behavior.

use event_stream::{
    EventService, InterestKey, Record, ServiceConfig, SubscriptionConfig, SubscriptionManager,
    SubscriptionState,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn manager() -> SubscriptionManager {
    init_tracing();
    SubscriptionManager::new(SubscriptionConfig::default()).unwrap()
}

// --- End-to-End ---

#[test]
fn test_subscribe_publish_cancel_scenario() {
    init_tracing();
    let service = EventService::new(ServiceConfig::default()).unwrap();

    let handle = service.subscribe(Vec::<String>::new());
    service.publish(Record::new("1", "click", 1000)).unwrap();

    let record = handle.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(*record, Record::new("1", "click", 1000));

    handle.cancel();
    service.flush();
    assert_eq!(handle.state(), SubscriptionState::Removed);

    service.publish(Record::new("2", "click", 1001)).unwrap();
    service.flush();

    assert!(handle.try_recv().is_err());
    assert_eq!(service.subscriptions().stats().delivered(), 1);
}

// --- Matching ---

#[test]
fn test_wildcard_receives_every_type() {
    let manager = manager();
    let handle = manager.subscribe(Vec::<String>::new());

    let types = ["click", "view", "purchase", "error.fatal"];
    for (i, t) in types.iter().enumerate() {
        manager
            .publish(Record::new(format!("{}", i), *t, 1000))
            .unwrap();
    }
    manager.flush();

    let received: Vec<String> = handle.receiver_drain();
    assert_eq!(received, vec!["0", "1", "2", "3"]);
}

#[test]
fn test_typed_subscription_ignores_other_types() {
    let manager = manager();
    let handle = manager.subscribe(["A", "B"]);

    manager.publish(Record::new("1", "C", 1000)).unwrap();
    manager.flush();
    assert!(handle.try_recv().is_err());

    manager.publish(Record::new("2", "B", 1000)).unwrap();
    manager.flush();
    assert_eq!(handle.try_recv().unwrap().id, "2");
}

#[test]
fn test_multi_type_subscription_registered_per_type() {
    let manager = manager();
    let handle = manager.subscribe(["A", "B"]);

    let registry = manager.registry();
    assert_eq!(registry.listener_count(&InterestKey::Type("A".into())), 1);
    assert_eq!(registry.listener_count(&InterestKey::Type("B".into())), 1);
    assert_eq!(registry.listener_count(&InterestKey::All), 0);
    assert!(registry.contains(handle.id()));
}

#[test]
fn test_per_listener_order_preserved() {
    let manager = manager();
    let typed = manager.subscribe(["click"]);
    let global = manager.subscribe(Vec::<String>::new());

    for i in 0..200 {
        manager
            .publish(Record::new(format!("{:03}", i), "click", 1000 + i))
            .unwrap();
    }
    manager.flush();

    let expected: Vec<String> = (0..200).map(|i| format!("{:03}", i)).collect();
    assert_eq!(typed.receiver_drain(), expected);
    assert_eq!(global.receiver_drain(), expected);
}

// --- Drops ---

#[test]
fn test_full_queue_drops_silently() {
    init_tracing();
    let manager = SubscriptionManager::new(SubscriptionConfig {
        buffer_size: 3,
        send_timeout_ms: 5,
    })
    .unwrap();
    let handle = manager.subscribe(Vec::<String>::new());

    for i in 0..10 {
        // Publishing never reports the drop.
        manager
            .publish(Record::new(format!("{}", i), "click", 1000))
            .unwrap();
    }
    manager.flush();

    assert_eq!(manager.stats().delivered(), 3);
    assert_eq!(manager.stats().dropped(), 7);
    assert_eq!(handle.receiver_drain(), vec!["0", "1", "2"]);
}

#[test]
fn test_reader_draining_during_wait_avoids_drop() {
    init_tracing();
    let manager = SubscriptionManager::new(SubscriptionConfig {
        buffer_size: 1,
        send_timeout_ms: 2000,
    })
    .unwrap();
    let handle = manager.subscribe(["click"]);

    manager.publish(Record::new("1", "click", 1000)).unwrap();
    manager.publish(Record::new("2", "click", 1000)).unwrap();

    // The second record waits for space until the first is read.
    assert_eq!(handle.recv().unwrap().id, "1");
    assert_eq!(handle.recv_timeout(Duration::from_secs(2)).unwrap().id, "2");
    manager.flush();
    assert_eq!(manager.stats().dropped(), 0);
}

// --- Cancellation ---

#[test]
fn test_cancel_stops_future_deliveries() {
    let manager = manager();
    let handle = manager.subscribe(["click", "view"]);

    manager.publish(Record::new("1", "click", 1000)).unwrap();
    manager.flush();

    handle.cancel();
    assert_ne!(handle.state(), SubscriptionState::Active);
    manager.flush();
    assert_eq!(handle.state(), SubscriptionState::Removed);
    assert!(!manager.registry().contains(handle.id()));

    let delivered = manager.stats().delivered();
    manager.publish(Record::new("2", "click", 1001)).unwrap();
    manager.publish(Record::new("3", "view", 1002)).unwrap();
    manager.flush();
    assert_eq!(manager.stats().delivered(), delivered);

    // Records queued before cancellation are still readable.
    assert_eq!(handle.receiver_drain(), vec!["1"]);
}

#[test]
fn test_cancel_from_another_thread() {
    let manager = manager();
    let handle = Arc::new(manager.subscribe(Vec::<String>::new()));

    let canceller = Arc::clone(&handle);
    thread::spawn(move || canceller.cancel()).join().unwrap();

    manager.flush();
    assert_eq!(handle.state(), SubscriptionState::Removed);
    assert!(manager.registry().is_empty());
}

// --- Concurrency ---

#[test]
fn test_concurrent_subscribe_cancel_and_publish() {
    let manager = Arc::new(manager());
    let baseline = manager.registry().len();
    let types = ["a", "b", "c"];

    let mut threads = Vec::new();

    for t in 0..8 {
        let manager = Arc::clone(&manager);
        threads.push(thread::spawn(move || {
            for i in 0..50 {
                let handle = if i % 3 == 0 {
                    manager.subscribe(Vec::<String>::new())
                } else {
                    manager.subscribe([types[(t + i) % 3], types[(t + i + 1) % 3]])
                };
                let _ = handle.try_recv();
                handle.cancel();
            }
        }));
    }

    for t in 0..4 {
        let manager = Arc::clone(&manager);
        threads.push(thread::spawn(move || {
            for i in 0..200 {
                manager
                    .publish(Record::new(format!("{}-{}", t, i), types[i % 3], 1000))
                    .unwrap();
            }
        }));
    }

    for handle in threads {
        handle.join().unwrap();
    }

    manager.flush();
    assert_eq!(manager.registry().len(), baseline);
    assert_eq!(manager.registry().key_count(), 0);
}

#[test]
fn test_subscribers_receive_while_others_churn() {
    let manager = Arc::new(manager());
    let steady = manager.subscribe(["steady"]);

    let churn = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            for _ in 0..100 {
                drop(manager.subscribe(["steady"]));
            }
        })
    };

    for i in 0..100 {
        manager
            .publish(Record::new(format!("{:03}", i), "steady", 1000))
            .unwrap();
    }
    churn.join().unwrap();
    manager.flush();

    let expected: Vec<String> = (0..100).map(|i| format!("{:03}", i)).collect();
    assert_eq!(steady.receiver_drain(), expected);
    assert_eq!(manager.registry().len(), 1);
}

/// Drain every record currently queued on a handle, returning the ids.
trait Drain {
    fn receiver_drain(&self) -> Vec<String>;
}

impl Drain for event_stream::SubscriptionHandle {
    fn receiver_drain(&self) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(record) = self.try_recv() {
            ids.push(record.id.clone());
        }
        ids
    }
}
