//! Mock MQTT channel for testing without a real broker.
//!
//! Records every publish and subscribe for assertion in tests and can be
//! told to fail either operation.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use rumqttc::QoS;

use crate::channel::Channel;
use crate::error::{MqttError, MqttResult};
use crate::transport::SubscriptionId;

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl PublishedMessage {
    /// Payload decoded as JSON; `Value::Null` for an empty payload.
    pub fn json(&self) -> serde_json::Value {
        if self.payload.is_empty() {
            return serde_json::Value::Null;
        }
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// A recorded subscribe call and the id handed back for it.
#[derive(Debug, Clone)]
pub struct RecordedSubscription {
    pub filter: String,
    pub qos: QoS,
    pub id: SubscriptionId,
}

/// Mock implementation of the `Channel` trait.
///
/// Thread-safe via `Mutex` (fine for test contexts).
pub struct MockChannel {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<RecordedSubscription>>,
    next_id: AtomicU64,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            fail_publish: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<RecordedSubscription> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.published.lock().unwrap().last().cloned()
    }

    /// Published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscription_id(filter).is_some()
    }

    /// Id returned by the most recent subscribe to `filter`.
    pub fn subscription_id(&self, filter: &str) -> Option<SubscriptionId> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.filter == filter)
            .map(|s| s.id)
    }

    /// Make subsequent publishes fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent subscribes fail.
    pub fn fail_subscribes(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Clear all recorded state.
    pub fn reset(&self) {
        self.published.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MqttError::Publish(format!("mock publish to {topic} failed")));
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<SubscriptionId> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(MqttError::Subscribe(format!("mock subscribe to {filter} failed")));
        }
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.subscriptions.lock().unwrap().push(RecordedSubscription {
            filter: filter.to_string(),
            qos,
            id,
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_records_messages() {
        let mock = MockChannel::new();
        mock.publish("test/topic", b"{\"a\":1}", QoS::AtLeastOnce)
            .await
            .unwrap();
        mock.publish("test/other", b"", QoS::AtMostOnce)
            .await
            .unwrap();

        let msgs = mock.published();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].topic, "test/topic");
        assert_eq!(msgs[0].json()["a"], 1);
        assert!(msgs[1].json().is_null());
        assert_eq!(mock.published_to("test/other").len(), 1);
        assert_eq!(mock.last_published().unwrap().topic, "test/other");
    }

    #[tokio::test]
    async fn subscribe_hands_out_distinct_ids() {
        let mock = MockChannel::new();
        let first = mock.subscribe("a/accepted", QoS::AtMostOnce).await.unwrap();
        let second = mock.subscribe("a/rejected", QoS::AtMostOnce).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(mock.subscription_id("a/accepted"), Some(first));
        assert!(mock.is_subscribed_to("a/rejected"));
        assert!(!mock.is_subscribed_to("a/delta"));
    }

    #[tokio::test]
    async fn injected_failures() {
        let mock = MockChannel::new();
        mock.fail_publishes(true);
        mock.fail_subscribes(true);

        assert!(matches!(
            mock.publish("t", b"", QoS::AtMostOnce).await,
            Err(MqttError::Publish(_))
        ));
        assert!(matches!(
            mock.subscribe("t", QoS::AtMostOnce).await,
            Err(MqttError::Subscribe(_))
        ));
        assert!(mock.published().is_empty());
        assert!(mock.subscriptions().is_empty());

        mock.fail_publishes(false);
        mock.publish("t", b"", QoS::AtMostOnce).await.unwrap();
        assert_eq!(mock.published().len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let mock = MockChannel::new();
        mock.publish("t", b"d", QoS::AtMostOnce).await.unwrap();
        mock.subscribe("f", QoS::AtLeastOnce).await.unwrap();

        mock.reset();
        assert!(mock.published().is_empty());
        assert!(mock.subscriptions().is_empty());
    }
}
