//! MQTT channel: async client for AWS IoT Core.
//!
//! Wraps `rumqttc::AsyncClient` and hands out a [`SubscriptionId`] for every
//! subscribe so acknowledgements can be matched back to their request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};
use crate::tls;
use crate::transport::{SubscriptionId, SubscriptionTracker};

/// Depth of rumqttc's request queue between the client and its event loop.
const REQUEST_CAPACITY: usize = 64;

// ── Channel trait ─────────────────────────────────────────────

/// Publish/subscribe capability a shadow client needs from its transport.
///
/// Enables mocking in tests without a real MQTT broker.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()>;

    /// Request a subscription. Completion is reported later as
    /// `TransportEvent::Subscribed` carrying the returned id.
    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<SubscriptionId>;
}

// ── MqttChannel ───────────────────────────────────────────────

/// MQTT channel connected to AWS IoT Core.
///
/// The `EventLoop` is returned separately from `new()`; the caller drives
/// it with [`crate::driver::run`].
pub struct MqttChannel {
    client: AsyncClient,
    client_id: String,
    tracker: Arc<SubscriptionTracker>,
    /// Keeps id allocation and request submission in the same order.
    subscribe_order: tokio::sync::Mutex<()>,
}

impl MqttChannel {
    /// Create a channel using the transport selected by `config`.
    pub fn new(config: &MqttConfig) -> MqttResult<(Self, EventLoop)> {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_secs.into()));
        options.set_max_packet_size(config.max_packet_size, config.max_packet_size);
        options.set_transport(tls::transport_for(config)?);

        tracing::info!(
            host = %config.broker_host,
            port = config.broker_port,
            client_id = %config.client_id,
            tls = config.use_tls,
            "MQTT channel created"
        );
        Ok(Self::with_options(options, &config.client_id))
    }

    /// Create a channel for a local broker without TLS.
    pub fn new_plaintext(host: &str, port: u16, client_id: &str) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));
        Self::with_options(options, client_id)
    }

    fn with_options(options: MqttOptions, client_id: &str) -> (Self, EventLoop) {
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        (
            Self {
                client,
                client_id: client_id.to_string(),
                tracker: Arc::new(SubscriptionTracker::new()),
                subscribe_order: tokio::sync::Mutex::new(()),
            },
            eventloop,
        )
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Tracker shared with the event-loop driver.
    pub fn tracker(&self) -> Arc<SubscriptionTracker> {
        Arc::clone(&self.tracker)
    }

    /// Send an MQTT DISCONNECT and stop the event loop after it drains.
    pub async fn disconnect(&self) -> MqttResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| MqttError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Channel for MqttChannel {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        self.client
            .publish(topic, qos, false, payload.to_vec())
            .await
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<SubscriptionId> {
        let _order = self.subscribe_order.lock().await;
        let id = self.tracker.enqueue();
        match self.client.subscribe(filter, qos).await {
            Ok(()) => Ok(id),
            Err(e) => {
                self.tracker.cancel(id);
                Err(MqttError::Subscribe(e.to_string()))
            }
        }
    }
}
