//! Shared test harness for E2E integration tests.
//!
//! Wires a started `ShadowClient` to a `MockChannel` and feeds transport
//! events through the client's sink, exercising the same path the MQTT
//! driver uses in production.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::Value;

use ds_mqtt_channel::{
    EventFilter, InboundMessage, MockChannel, ShadowClient, ShadowOptions, SubscriptionId,
    TransportEvent, TransportSink,
};
use ds_protocol::topics;
use ds_protocol::{EventKind, ShadowEvent};

pub const THING: &str = "rpi-001";

/// One shadow client under test, plus everything it published and dispatched.
pub struct Harness {
    pub mqtt: Arc<MockChannel>,
    pub client: ShadowClient<MockChannel>,
    pub sink: TransportSink,
    events: Arc<Mutex<Vec<ShadowEvent>>>,
}

impl Harness {
    /// Classic shadow of `rpi-001` with default options.
    pub fn classic() -> Self {
        Self::with_options(THING, None, ShadowOptions::default())
    }

    pub fn named(shadow_name: &str) -> Self {
        Self::with_options(THING, Some(shadow_name), ShadowOptions::default())
    }

    pub fn with_options(thing: &str, shadow_name: Option<&str>, options: ShadowOptions) -> Self {
        Self::on_channel(Arc::new(MockChannel::new()), thing, shadow_name, options)
    }

    /// A client sharing `mqtt` with other clients.
    pub fn on_channel(
        mqtt: Arc<MockChannel>,
        thing: &str,
        shadow_name: Option<&str>,
        options: ShadowOptions,
    ) -> Self {
        let client = ShadowClient::init(Arc::clone(&mqtt), thing, shadow_name, options)
            .expect("valid client");
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = Arc::clone(&events);
            client.register_handler(EventFilter::Any, move |event: &ShadowEvent| {
                events.lock().unwrap().push(event.clone());
            });
        }
        let sink = client.start();
        Self {
            mqtt,
            client,
            sink,
            events,
        }
    }

    pub fn prefix(&self) -> String {
        self.client.topic_prefix().to_string()
    }

    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.client.topic_prefix())
    }

    /// Let the client's event task drain its queue.
    pub async fn settle(&self) {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    pub async fn send(&self, event: TransportEvent) {
        assert!(self.sink.send(event), "client event loop stopped");
        self.settle().await;
    }

    pub async fn connect(&self) {
        self.send(TransportEvent::Connected).await;
    }

    /// Ids of this client's subscriptions, in issue order.
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        let prefix = self.prefix();
        self.mqtt
            .subscriptions()
            .into_iter()
            .filter(|s| topics::classify(&prefix, &s.filter).is_some())
            .map(|s| s.id)
            .collect()
    }

    pub async fn ack(&self, ids: &[SubscriptionId]) {
        for id in ids {
            self.sink.send(TransportEvent::Subscribed(*id));
        }
        self.settle().await;
    }

    /// Connect and acknowledge every subscription.
    pub async fn make_ready(&self) {
        self.connect().await;
        let ids = self.subscription_ids();
        self.ack(&ids).await;
        assert!(self.client.is_ready(), "client should be ready");
    }

    /// Deliver a publish on `{prefix}/{suffix}`.
    pub async fn deliver(&self, suffix: &str, payload: &Value) {
        let bytes = serde_json::to_vec(payload).unwrap();
        self.deliver_raw(suffix, bytes).await;
    }

    pub async fn deliver_raw(&self, suffix: &str, payload: impl Into<bytes::Bytes>) {
        let message = InboundMessage::complete(self.topic(suffix), payload);
        self.send(TransportEvent::Message(message)).await;
    }

    pub fn events(&self) -> Vec<ShadowEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Payloads published to `{prefix}/{operation}`.
    pub fn requests(&self, operation: &str) -> Vec<Value> {
        self.mqtt
            .published_to(&self.topic(operation))
            .iter()
            .map(|m| m.json())
            .collect()
    }
}
