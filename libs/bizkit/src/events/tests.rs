use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

use super::*;

/* --------------------------- Test helpers ------------------------- */

fn recording(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Arc<dyn EventHandler> {
    let log = Arc::clone(log);
    handler_fn(move |_event| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(tag.to_string());
            anyhow::Ok(())
        }
    })
}

fn failing(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Arc<dyn EventHandler> {
    let log = Arc::clone(log);
    handler_fn(move |_event| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(tag.to_string());
            Err::<(), _>(anyhow::anyhow!("{tag} refused the event"))
        }
    })
}

fn counting(counter: &Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
    let counter = Arc::clone(counter);
    handler_fn(move |_event| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        }
    })
}

/* ------------------------------- Tests ---------------------------- */

#[tokio::test]
async fn duplicate_identity_per_event_type_is_rejected() {
    let bus = EventBus::new(16);
    let log = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe("invoice.created", "h1", recording(&log, "a"), 0)
        .unwrap();
    let err = bus
        .subscribe("invoice.created", "h1", recording(&log, "b"), 0)
        .unwrap_err();
    assert!(matches!(err, EventBusError::DuplicateHandler { .. }));

    // Same identity on a different type is fine.
    bus.subscribe("invoice.paid", "h1", recording(&log, "c"), 0)
        .unwrap();
    assert_eq!(bus.subscribers("invoice.created").len(), 1);
    assert_eq!(bus.subscribers("invoice.paid").len(), 1);
}

#[tokio::test]
async fn publish_without_subscribers_is_a_noop() {
    let bus = EventBus::new(16);
    bus.publish("x", json!({"k": 1})).await.unwrap();
    assert!(bus.subscribers("x").is_empty());
}

#[tokio::test]
async fn publish_continues_past_failing_handler() {
    let bus = EventBus::new(16);
    let log = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe("x", "first", recording(&log, "first"), 0).unwrap();
    bus.subscribe("x", "second", failing(&log, "second"), 0).unwrap();
    bus.subscribe("x", "third", recording(&log, "third"), 0).unwrap();

    let err = bus.publish("x", json!(null)).await.unwrap_err();

    assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    assert_eq!(err.failed_handlers(), vec!["second"]);
    let msg = err.to_string();
    assert!(msg.contains("second"), "unexpected message: {msg}");
    assert!(!msg.contains("first"), "unexpected message: {msg}");
}

#[tokio::test]
async fn higher_priority_runs_first_and_ties_keep_subscription_order() {
    let bus = EventBus::new(16);
    let log = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe("x", "low", recording(&log, "low"), -5).unwrap();
    bus.subscribe("x", "mid_a", recording(&log, "mid_a"), 10).unwrap();
    bus.subscribe("x", "high", recording(&log, "high"), 100).unwrap();
    bus.subscribe("x", "mid_b", recording(&log, "mid_b"), 10).unwrap();

    bus.publish("x", json!({})).await.unwrap();
    assert_eq!(*log.lock(), vec!["high", "mid_a", "mid_b", "low"]);

    let names: Vec<_> = bus.subscribers("x").into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["high", "mid_a", "mid_b", "low"]);
}

#[tokio::test]
async fn handlers_receive_the_payload() {
    let bus = EventBus::new(16);
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        "client.created",
        "capture",
        handler_fn(move |event| {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock() = Some(event);
                anyhow::Ok(())
            }
        }),
        0,
    )
    .unwrap();

    bus.publish("client.created", json!({"client_id": "c-1"}))
        .await
        .unwrap();

    let event = seen.lock().take().expect("handler was called");
    assert_eq!(event.event_type, "client.created");
    #[derive(serde::Deserialize)]
    struct Payload {
        client_id: String,
    }
    assert_eq!(event.payload_as::<Payload>().unwrap().client_id, "c-1");
}

#[tokio::test]
async fn unsubscribe_by_token_removes_only_that_subscription() {
    let bus = EventBus::new(16);
    let counter = Arc::new(AtomicUsize::new(0));

    let a = bus.subscribe("x", "a", counting(&counter), 0).unwrap();
    bus.subscribe("x", "b", counting(&counter), 0).unwrap();

    bus.unsubscribe(a).unwrap();
    bus.publish("x", json!(null)).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let err = bus.unsubscribe(a).unwrap_err();
    assert!(matches!(err, EventBusError::SubscriptionNotFound(id) if id == a));
}

#[tokio::test]
async fn unsubscribe_handler_removes_identity_everywhere() {
    let bus = EventBus::new(16);
    let counter = Arc::new(AtomicUsize::new(0));

    bus.subscribe("x", "audit", counting(&counter), 0).unwrap();
    bus.subscribe("y", "audit", counting(&counter), 0).unwrap();
    bus.subscribe("y", "other", counting(&counter), 0).unwrap();

    bus.unsubscribe_handler("audit").unwrap();
    assert!(bus.subscribers("x").is_empty());
    assert_eq!(bus.subscribers("y").len(), 1);

    let err = bus.unsubscribe_handler("audit").unwrap_err();
    assert!(matches!(err, EventBusError::HandlerNotFound(name) if name == "audit"));
}

#[tokio::test]
async fn subscribers_returns_a_defensive_copy() {
    let bus = EventBus::new(16);
    let counter = Arc::new(AtomicUsize::new(0));
    bus.subscribe("x", "a", counting(&counter), 0).unwrap();

    let mut copy = bus.subscribers("x");
    copy.clear();
    assert_eq!(bus.subscribers("x").len(), 1);
}

#[tokio::test]
async fn shutdown_waits_for_queued_events() {
    let bus = EventBus::new(64);
    let counter = Arc::new(AtomicUsize::new(0));
    let slow = Arc::clone(&counter);
    bus.subscribe(
        "x",
        "slow",
        handler_fn(move |_event| {
            let slow = Arc::clone(&slow);
            async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                slow.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        }),
        0,
    )
    .unwrap();

    for i in 0..20 {
        bus.publish_async("x", json!({ "n": i })).unwrap();
    }
    bus.shutdown(Duration::from_secs(5)).await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 20);
    assert_eq!(bus.state(), BusState::Stopped);
}

#[tokio::test]
async fn queued_events_are_delivered_in_fifo_order() {
    let bus = EventBus::new(64);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        "x",
        "order",
        handler_fn(move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(event.payload["n"].as_u64().unwrap_or_default());
                anyhow::Ok(())
            }
        }),
        0,
    )
    .unwrap();

    for n in 0..10u64 {
        bus.publish_async("x", json!({ "n": n })).unwrap();
    }
    bus.shutdown(Duration::from_secs(5)).await.unwrap();

    assert_eq!(*seen.lock(), (0..10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn flooding_the_queue_drops_overflow_without_blocking() {
    let bus = EventBus::new(4);
    let gate = Arc::new(Notify::new());
    let delivered = Arc::new(AtomicUsize::new(0));

    let wait = Arc::clone(&gate);
    let count = Arc::clone(&delivered);
    bus.subscribe(
        "x",
        "gated",
        handler_fn(move |_event| {
            let wait = Arc::clone(&wait);
            let count = Arc::clone(&count);
            async move {
                wait.notified().await;
                count.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        }),
        0,
    )
    .unwrap();

    let started = Instant::now();
    for i in 0..100 {
        bus.publish_async("x", json!({ "n": i })).unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(bus.dropped_events() >= 95, "dropped {}", bus.dropped_events());

    // Release the worker for whatever made it into the queue.
    let releaser = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            for _ in 0..10 {
                gate.notify_one();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };
    bus.shutdown(Duration::from_secs(5)).await.unwrap();
    releaser.await.unwrap();

    let total = delivered.load(Ordering::SeqCst) as u64 + bus.dropped_events();
    assert_eq!(total, 100);
}

#[tokio::test]
async fn shutdown_times_out_when_handlers_are_too_slow() {
    let bus = EventBus::new(16);
    bus.subscribe(
        "x",
        "sleepy",
        handler_fn(|_event| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            anyhow::Ok(())
        }),
        0,
    )
    .unwrap();

    bus.publish_async("x", json!(null)).unwrap();
    bus.publish_async("x", json!(null)).unwrap();

    let err = bus.shutdown(Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, EventBusError::ShutdownTimeout(_)));
    assert_eq!(bus.state(), BusState::Stopped);
}

#[tokio::test]
async fn concurrent_shutdown_waits_for_the_first_drain() {
    let bus = Arc::new(EventBus::new(16));
    let handled = Arc::new(AtomicUsize::new(0));
    let slow = Arc::clone(&handled);
    bus.subscribe(
        "x",
        "slow",
        handler_fn(move |_event| {
            let slow = Arc::clone(&slow);
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                slow.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        }),
        0,
    )
    .unwrap();
    bus.publish_async("x", json!(null)).unwrap();

    let first = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move { bus.shutdown(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bus.state(), BusState::ShuttingDown);

    // Sync delivery keeps working while the queue drains.
    bus.publish("y", json!(null)).await.unwrap();

    // A caller with a shorter deadline gives up without stopping the bus.
    let err = bus.shutdown(Duration::from_millis(10)).await.unwrap_err();
    assert!(matches!(err, EventBusError::ShutdownTimeout(_)));
    assert_eq!(bus.state(), BusState::ShuttingDown);

    bus.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert_eq!(bus.state(), BusState::Stopped);

    first.await.unwrap().unwrap();
}

#[tokio::test]
async fn operations_after_shutdown_are_rejected() {
    let bus = EventBus::new(16);
    let counter = Arc::new(AtomicUsize::new(0));
    bus.shutdown(Duration::from_secs(1)).await.unwrap();

    assert!(matches!(
        bus.publish_async("x", json!(null)),
        Err(EventBusError::Closed)
    ));
    assert!(matches!(
        bus.publish("x", json!(null)).await,
        Err(EventBusError::Closed)
    ));
    assert!(matches!(
        bus.subscribe("x", "late", counting(&counter), 0),
        Err(EventBusError::Closed)
    ));

    // Second shutdown is a no-op.
    bus.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn failing_queued_handler_does_not_stop_the_worker() {
    let bus = EventBus::new(16);
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe("x", "bad", failing(&log, "bad"), 10).unwrap();
    bus.subscribe(
        "x",
        "panicky",
        handler_fn(|event| async move {
            if event.payload["panic"].as_bool().unwrap_or(false) {
                panic!("boom");
            }
            anyhow::Ok(())
        }),
        5,
    )
    .unwrap();
    bus.subscribe("x", "good", recording(&log, "good"), 0).unwrap();

    bus.publish_async("x", json!({"panic": true})).unwrap();
    bus.publish_async("x", json!({"panic": false})).unwrap();
    bus.shutdown(Duration::from_secs(5)).await.unwrap();

    // First event: "bad" ran, then the panic aborted that delivery.
    // Second event: all three handlers ran.
    assert_eq!(*log.lock(), vec!["bad", "bad", "good"]);
}
