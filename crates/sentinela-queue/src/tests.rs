use crate::internal::InternalQueue;
use crate::{MessageKind, QueueError, WorkQueue};
use serde_json::json;
use std::time::Duration;

fn queue() -> InternalQueue {
    InternalQueue::new(16, Duration::from_secs(30))
}

#[tokio::test]
async fn delivers_in_fifo_order() {
    let q = queue();
    for i in 0..3 {
        q.send(MessageKind::Monitor, json!({"monitor_id": i}))
            .await
            .unwrap();
    }

    for i in 0..3 {
        let message = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(message.kind, MessageKind::Monitor);
        assert_eq!(message.payload["monitor_id"], i);
        q.ack(&message).await.unwrap();
    }
    assert!(q.is_empty().await);
}

#[tokio::test]
async fn empty_receive_returns_none_after_wait() {
    let q = queue();
    let got = q.receive(Duration::from_millis(20)).await.unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn receive_wakes_on_send() {
    let q = std::sync::Arc::new(queue());
    let receiver = {
        let q = q.clone();
        tokio::spawn(async move { q.receive(Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    q.send(MessageKind::Event, json!({"event_name": "alert_created"}))
        .await
        .unwrap();

    let message = receiver.await.unwrap().unwrap().unwrap();
    assert_eq!(message.kind, MessageKind::Event);
}

#[tokio::test(start_paused = true)]
async fn unacked_message_is_redelivered_after_visibility_expires() {
    let q = InternalQueue::new(16, Duration::from_secs(30));
    q.send(MessageKind::Monitor, json!({"monitor_id": 1}))
        .await
        .unwrap();

    let first = q.receive(Duration::from_secs(1)).await.unwrap().unwrap();
    // Invisible while the lease holds.
    assert!(q.receive(Duration::from_millis(100)).await.unwrap().is_none());

    tokio::time::advance(Duration::from_secs(31)).await;

    let second = q.receive(Duration::from_secs(1)).await.unwrap().unwrap();
    assert_eq!(second.payload, first.payload);
    assert_ne!(second.receipt, first.receipt, "redelivery gets a new receipt");
}

#[tokio::test(start_paused = true)]
async fn extend_visibility_postpones_redelivery() {
    let q = InternalQueue::new(16, Duration::from_secs(30));
    q.send(MessageKind::Monitor, json!({"monitor_id": 1}))
        .await
        .unwrap();

    let message = q.receive(Duration::from_secs(1)).await.unwrap().unwrap();

    tokio::time::advance(Duration::from_secs(25)).await;
    q.extend_visibility(&message, Duration::from_secs(30))
        .await
        .unwrap();

    // The original window has passed but the lease was renewed.
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(q.receive(Duration::from_millis(100)).await.unwrap().is_none());

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(q.receive(Duration::from_secs(1)).await.unwrap().is_some());
}

#[tokio::test]
async fn ack_prevents_redelivery_and_is_idempotent() {
    let q = queue();
    q.send(MessageKind::Request, json!({"action": "issue_drop"}))
        .await
        .unwrap();

    let message = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
    q.ack(&message).await.unwrap();
    q.ack(&message).await.unwrap();

    assert!(q.is_empty().await);
    assert!(q.receive(Duration::from_millis(10)).await.unwrap().is_none());
}

#[tokio::test]
async fn nack_returns_message_immediately() {
    let q = queue();
    q.send(MessageKind::Monitor, json!({"monitor_id": 7}))
        .await
        .unwrap();

    let message = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
    q.nack(&message).await.unwrap();

    let again = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
    assert_eq!(again.payload["monitor_id"], 7);
}

#[tokio::test]
async fn bounded_capacity_rejects_overflow() {
    let q = InternalQueue::new(2, Duration::from_secs(30));
    q.send(MessageKind::Monitor, json!({"monitor_id": 1}))
        .await
        .unwrap();
    q.send(MessageKind::Monitor, json!({"monitor_id": 2}))
        .await
        .unwrap();

    let err = q
        .send(MessageKind::Monitor, json!({"monitor_id": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Full { capacity: 2 }));

    // Acking frees a slot. In-flight messages still count against the
    // bound until then.
    let message = q.receive(Duration::from_millis(10)).await.unwrap().unwrap();
    let err = q
        .send(MessageKind::Monitor, json!({"monitor_id": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Full { .. }));
    q.ack(&message).await.unwrap();
    q.send(MessageKind::Monitor, json!({"monitor_id": 3}))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn redelivered_message_keeps_its_place_in_line() {
    let q = InternalQueue::new(16, Duration::from_secs(10));
    q.send(MessageKind::Monitor, json!({"monitor_id": 1}))
        .await
        .unwrap();
    q.send(MessageKind::Monitor, json!({"monitor_id": 2}))
        .await
        .unwrap();

    // Take the first message and let its lease lapse.
    let first = q.receive(Duration::from_secs(1)).await.unwrap().unwrap();
    assert_eq!(first.payload["monitor_id"], 1);
    tokio::time::advance(Duration::from_secs(11)).await;

    // The expired message comes back before the younger one.
    let redelivered = q.receive(Duration::from_secs(1)).await.unwrap().unwrap();
    assert_eq!(redelivered.payload["monitor_id"], 1);
    let next = q.receive(Duration::from_secs(1)).await.unwrap().unwrap();
    assert_eq!(next.payload["monitor_id"], 2);
}
