//! End-to-end tests for subscription readiness across connect/disconnect cycles.

mod helpers;

use std::time::Duration;

use ds_mqtt_channel::{ShadowOptions, SubscriptionId, SubscriptionState, TransportEvent};
use ds_protocol::EventKind;
use helpers::Harness;
use rumqttc::QoS;
use serde_json::Value;

/// Acknowledge in `order` (indices into the issued subscriptions) and check
/// that exactly one Ready and one GET appear, only after the last ack.
async fn ready_after(order: &[usize]) {
    let harness = Harness::classic();
    harness.connect().await;
    let ids = harness.subscription_ids();
    assert_eq!(ids.len(), order.len());

    let (last, rest) = order.split_last().unwrap();
    let rest: Vec<SubscriptionId> = rest.iter().map(|i| ids[*i]).collect();
    harness.ack(&rest).await;
    assert!(harness.kinds().is_empty(), "ready before all acks: {order:?}");
    assert!(harness.requests("get").is_empty());

    harness.ack(&[ids[*last]]).await;
    assert_eq!(harness.kinds(), vec![EventKind::Ready]);
    assert_eq!(harness.requests("get"), vec![Value::Null]);
}

#[tokio::test]
async fn e2e_ready_is_order_independent() {
    ready_after(&[0, 1, 2, 3, 4, 5, 6]).await;
    ready_after(&[6, 5, 4, 3, 2, 1, 0]).await;
    ready_after(&[3, 0, 6, 1, 5, 2, 4]).await;
    ready_after(&[4, 6, 0, 2, 1, 3, 5]).await;
}

#[tokio::test]
async fn e2e_subscriptions_use_configured_qos() {
    let harness = Harness::classic();
    harness.connect().await;

    let subs = harness.mqtt.subscriptions();
    let filters: Vec<&str> = subs.iter().map(|s| s.filter.as_str()).collect();
    assert_eq!(
        filters,
        vec![
            "$aws/things/rpi-001/shadow/get/accepted",
            "$aws/things/rpi-001/shadow/get/rejected",
            "$aws/things/rpi-001/shadow/update/accepted",
            "$aws/things/rpi-001/shadow/update/rejected",
            "$aws/things/rpi-001/shadow/update/delta",
            "$aws/things/rpi-001/shadow/delete/accepted",
            "$aws/things/rpi-001/shadow/delete/rejected",
        ]
    );
    assert!(subs.iter().all(|s| s.qos == QoS::AtMostOnce));

    harness.ack(&harness.subscription_ids()).await;
    let get = harness.mqtt.published_to(&harness.topic("get"));
    assert_eq!(get[0].qos, QoS::AtLeastOnce);
}

#[tokio::test]
async fn e2e_delta_disabled_needs_six_acks() {
    let harness = Harness::with_options(
        "rpi-001",
        None,
        ShadowOptions {
            enable_delta: false,
            ..Default::default()
        },
    );
    harness.make_ready().await;
    assert_eq!(harness.subscription_ids().len(), 6);

    // A stray delta is not routed when the topic was never subscribed.
    harness
        .deliver("update/delta", &serde_json::json!({"state": {"a": 1}}))
        .await;
    assert_eq!(harness.kinds(), vec![EventKind::Ready]);
}

#[tokio::test]
async fn e2e_stray_acks_are_ignored() {
    let harness = Harness::classic();
    harness.connect().await;
    let ids = harness.subscription_ids();

    harness
        .ack(&[SubscriptionId::new(9_999), ids[0], ids[0], ids[1]])
        .await;
    assert!(!harness.client.is_ready());
    let SubscriptionState::Subscribing { pending } = harness.client.subscription_state().await
    else {
        panic!("should still be subscribing");
    };
    assert_eq!(pending.len(), 5);
}

#[tokio::test]
async fn e2e_disconnect_resets_and_reconnect_resubscribes() {
    let harness = Harness::classic();
    harness.make_ready().await;
    let first_round = harness.subscription_ids();

    harness.send(TransportEvent::Disconnected).await;
    assert!(!harness.client.is_ready());
    assert_eq!(
        harness.client.subscription_state().await,
        SubscriptionState::Disconnected
    );
    assert_eq!(harness.kinds(), vec![EventKind::Ready, EventKind::Disconnected]);

    harness.mqtt.reset();
    harness.clear_events();
    harness.connect().await;
    let second_round = harness.subscription_ids();
    assert_eq!(second_round.len(), 7);

    // Acks from the previous connection do not count.
    harness.ack(&first_round).await;
    assert!(!harness.client.is_ready());

    harness.ack(&second_round).await;
    assert!(harness.client.is_ready());
    assert_eq!(harness.kinds(), vec![EventKind::Ready]);
    assert_eq!(harness.requests("get").len(), 1);
}

#[tokio::test]
async fn e2e_each_disconnect_fires_even_when_never_connected() {
    let harness = Harness::classic();
    harness.send(TransportEvent::Disconnected).await;
    harness.send(TransportEvent::Disconnected).await;
    assert_eq!(
        harness.kinds(),
        vec![EventKind::Disconnected, EventKind::Disconnected]
    );
    assert!(harness.mqtt.published().is_empty());
}

#[tokio::test]
async fn e2e_wait_for_ready_from_another_task() {
    let harness = Harness::classic();
    let waiter = {
        let client = harness.client.clone();
        tokio::spawn(async move { client.wait_for_ready(Duration::from_secs(10)).await })
    };

    harness.make_ready().await;
    assert!(waiter.await.unwrap());
    // Waiting has no side effects of its own.
    assert_eq!(harness.mqtt.subscriptions().len(), 7);
    assert_eq!(harness.mqtt.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn e2e_wait_for_ready_times_out_without_acks() {
    let harness = Harness::classic();
    harness.connect().await;
    assert!(!harness.client.wait_for_ready(Duration::from_secs(3)).await);
    assert!(!harness.client.is_ready());
}

#[tokio::test]
async fn e2e_transport_error_keeps_state() {
    let harness = Harness::classic();
    harness.make_ready().await;
    harness
        .send(TransportEvent::Error("network timeout".into()))
        .await;
    assert!(harness.client.is_ready());
    assert_eq!(harness.kinds(), vec![EventKind::Ready]);
}
