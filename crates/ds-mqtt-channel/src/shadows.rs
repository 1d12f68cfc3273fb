//! AWS IoT Device Shadow client.
//!
//! One [`ShadowClient`] serves one (thing, optional shadow name) pair over a
//! shared [`Channel`]. Transport notifications are processed one at a time:
//! subscription bookkeeping, routing and handler dispatch for a client never
//! overlap, so a disconnect cannot interleave with a half-dispatched message.
//!
//! ```ignore
//! let client = ShadowClient::init(channel, "rpi-001", None, ShadowOptions::default())?;
//! client.register_handler(EventKind::UpdateDelta, |event| { /* ... */ });
//! let sink = client.start();
//! tokio::spawn(driver::run(eventloop, &mqtt, vec![sink]));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::QoS;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, Notify, mpsc, watch};

use ds_protocol::topics::{self, Operation};
use ds_protocol::{EventKind, ProtocolError, ShadowEvent, UpdateRequest};

use crate::channel::Channel;
use crate::config::{ShadowOptions, qos_from_level};
use crate::dispatcher::{Dispatcher, EventFilter, HandlerId};
use crate::error::{MqttError, MqttResult};
use crate::router::{Routed, Router};
use crate::subscriptions::{Acknowledgement, SubscriptionCoordinator, SubscriptionState};
use crate::transport::{InboundMessage, SubscriptionId, TransportEvent, TransportSink};

/// Device shadow client backed by a `Channel` implementation.
///
/// Cheap to clone; clones share state. Handlers that want to send a request
/// clone the client and spawn it.
pub struct ShadowClient<C: Channel> {
    inner: Arc<Inner<C>>,
}

struct Inner<C: Channel> {
    channel: Arc<C>,
    thing_name: String,
    shadow_name: Option<String>,
    prefix: String,
    max_topic_len: usize,
    subscribe_qos: QoS,
    publish_qos: QoS,
    router: Router,
    dispatcher: Dispatcher,
    coordinator: Mutex<SubscriptionCoordinator>,
    ready: watch::Sender<bool>,
    deleted: AtomicBool,
    shutdown: Notify,
}

impl<C: Channel> Clone for ShadowClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Channel> ShadowClient<C> {
    /// Bind a client to `channel`.
    ///
    /// An empty `shadow_name` selects the classic shadow. Fails without side
    /// effects on invalid names or options.
    pub fn init(
        channel: Arc<C>,
        thing_name: &str,
        shadow_name: Option<&str>,
        options: ShadowOptions,
    ) -> MqttResult<Self> {
        let shadow_name = shadow_name.filter(|name| !name.is_empty());
        let prefix = topics::derive_prefix(thing_name, shadow_name)?;
        let subscribe_qos = qos_from_level(options.subscribe_qos)?;
        let publish_qos = qos_from_level(options.publish_qos)?;

        // Every topic this client will ever build must fit the ceiling.
        for topic in topics::response_topics(options.enable_delta) {
            topics::topic_for(&prefix, topic.operation, topic.suffix, options.max_topic_len)?;
        }

        let shadow_name = shadow_name.map(str::to_string);
        let router = Router::new(
            prefix.clone(),
            thing_name,
            shadow_name.clone(),
            options.enable_delta,
        );
        let (ready, _) = watch::channel(false);

        tracing::info!(
            prefix = %prefix,
            delta = options.enable_delta,
            "shadow client initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                channel,
                thing_name: thing_name.to_string(),
                shadow_name,
                prefix,
                max_topic_len: options.max_topic_len,
                subscribe_qos,
                publish_qos,
                router,
                dispatcher: Dispatcher::new(),
                coordinator: Mutex::new(SubscriptionCoordinator::new(options.enable_delta)),
                ready,
                deleted: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        })
    }

    pub fn thing_name(&self) -> &str {
        &self.inner.thing_name
    }

    /// `None` for the classic shadow.
    pub fn shadow_name(&self) -> Option<&str> {
        self.inner.shadow_name.as_deref()
    }

    pub fn topic_prefix(&self) -> &str {
        &self.inner.prefix
    }

    pub async fn subscription_state(&self) -> SubscriptionState {
        let mut coordinator = self.inner.coordinator.lock().await;
        if self.is_deleted() {
            coordinator.reset();
        }
        coordinator.state().clone()
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::SeqCst)
    }

    // ── Handlers ──────────────────────────────────────────────

    /// Register `handler` for `filter`: an [`EventKind`] or [`EventFilter::Any`].
    pub fn register_handler<F>(&self, filter: impl Into<EventFilter>, handler: F) -> HandlerId
    where
        F: Fn(&ShadowEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.register(filter, handler)
    }

    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        self.inner.dispatcher.unregister(id)
    }

    // ── Readiness ─────────────────────────────────────────────

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Wait until every response topic is acknowledged or `timeout` elapses.
    pub async fn wait_for_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.inner.ready.subscribe();
        matches!(
            tokio::time::timeout(timeout, ready.wait_for(|is_ready| *is_ready)).await,
            Ok(Ok(_))
        )
    }

    // ── Requests ──────────────────────────────────────────────

    /// Ask for the current shadow document; answered on `get/accepted`.
    pub async fn request_get(&self) -> MqttResult<()> {
        self.publish(Operation::Get, &[]).await
    }

    pub async fn request_delete(&self) -> MqttResult<()> {
        self.publish(Operation::Delete, &[]).await
    }

    /// Publish an update built from the supplied fragments.
    ///
    /// Does nothing and succeeds when neither fragment has content.
    pub async fn request_update(
        &self,
        desired: Option<&Map<String, Value>>,
        reported: Option<&Map<String, Value>>,
        client_token: Option<&str>,
    ) -> MqttResult<()> {
        self.ensure_open()?;
        let Some(request) = UpdateRequest::new(desired, reported, client_token) else {
            tracing::debug!(prefix = %self.inner.prefix, "nothing to update, skipping publish");
            return Ok(());
        };
        self.publish(Operation::Update, &request.to_vec()?).await
    }

    pub async fn request_update_reported(
        &self,
        reported: &Map<String, Value>,
        client_token: Option<&str>,
    ) -> MqttResult<()> {
        self.request_update(None, Some(reported), client_token)
            .await
    }

    pub async fn request_update_desired(
        &self,
        desired: &Map<String, Value>,
        client_token: Option<&str>,
    ) -> MqttResult<()> {
        self.request_update(Some(desired), None, client_token)
            .await
    }

    /// Publish `document` to `update` as-is.
    pub async fn request_update_raw(&self, document: &Value) -> MqttResult<()> {
        let bytes =
            serde_json::to_vec(document).map_err(|e| MqttError::Serialization(e.to_string()))?;
        self.publish(Operation::Update, &bytes).await
    }

    async fn publish(&self, operation: Operation, payload: &[u8]) -> MqttResult<()> {
        self.ensure_open()?;
        let topic = topics::topic_for(
            &self.inner.prefix,
            operation,
            None,
            self.inner.max_topic_len,
        )?;
        self.inner
            .channel
            .publish(&topic, payload, self.inner.publish_qos)
            .await?;
        tracing::info!(topic = %topic, bytes = payload.len(), "shadow request published");
        Ok(())
    }

    fn ensure_open(&self) -> MqttResult<()> {
        if self.is_deleted() {
            return Err(MqttError::Closed);
        }
        Ok(())
    }

    // ── Transport events ──────────────────────────────────────

    /// Process one transport notification.
    ///
    /// Callers that feed events directly (instead of through [`start`]) must
    /// not call this concurrently for the same client if they care about
    /// ordering; concurrent calls are serialized but their order is not.
    ///
    /// [`start`]: ShadowClient::start
    pub async fn handle_event(&self, event: &TransportEvent) -> MqttResult<()> {
        let mut coordinator = self.inner.coordinator.lock().await;
        if self.is_deleted() {
            coordinator.reset();
            return Ok(());
        }

        let result = match event {
            TransportEvent::Connected => self.on_connected(&mut coordinator).await,
            TransportEvent::Disconnected => {
                self.on_disconnected(&mut coordinator);
                Ok(())
            }
            TransportEvent::Subscribed(id) => {
                self.on_subscribed(&mut coordinator, *id).await;
                Ok(())
            }
            TransportEvent::Message(message) => self.on_message(message),
            TransportEvent::Error(details) => {
                tracing::warn!(prefix = %self.inner.prefix, details = %details, "transport error");
                Ok(())
            }
        };

        // `delete` cannot reset the coordinator while this call holds it.
        if self.is_deleted() {
            coordinator.reset();
            self.inner.ready.send_replace(false);
        }
        result
    }

    async fn on_connected(&self, coordinator: &mut SubscriptionCoordinator) -> MqttResult<()> {
        self.inner.ready.send_replace(false);
        coordinator.begin();

        let mut first_error = None;
        for topic in coordinator.topics().to_vec() {
            let result = self.subscribe(topic.operation, topic.suffix).await;
            if self.is_deleted() {
                tracing::debug!(prefix = %self.inner.prefix, "client deleted while subscribing");
                return Ok(());
            }
            match result {
                Ok((filter, id)) => {
                    tracing::debug!(topic = %filter, subscription = %id, "subscribe requested");
                    coordinator.record_request(id, topic);
                }
                Err(e) => {
                    tracing::error!(prefix = %self.inner.prefix, topic = %topic, error = %e, "subscribe failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn subscribe(
        &self,
        operation: Operation,
        suffix: Option<topics::Suffix>,
    ) -> MqttResult<(String, SubscriptionId)> {
        let filter = topics::topic_for(&self.inner.prefix, operation, suffix, self.inner.max_topic_len)?;
        let id = self
            .inner
            .channel
            .subscribe(&filter, self.inner.subscribe_qos)
            .await?;
        Ok((filter, id))
    }

    fn on_disconnected(&self, coordinator: &mut SubscriptionCoordinator) {
        coordinator.reset();
        self.inner.ready.send_replace(false);
        tracing::info!(prefix = %self.inner.prefix, "shadow disconnected");
        self.dispatch(ShadowEvent::bare(
            EventKind::Disconnected,
            &self.inner.thing_name,
            self.shadow_name(),
        ));
    }

    async fn on_subscribed(&self, coordinator: &mut SubscriptionCoordinator, id: SubscriptionId) {
        match coordinator.acknowledge(id) {
            Acknowledgement::Ignored => {
                tracing::debug!(subscription = %id, "ignoring unknown subscription ack");
            }
            Acknowledgement::Pending(remaining) => {
                tracing::debug!(subscription = %id, remaining, "subscription acknowledged");
            }
            Acknowledgement::Ready => {
                // Checked under the watch lock so a concurrent `delete` wins.
                let became_ready = self.inner.ready.send_if_modified(|ready| {
                    if self.is_deleted() {
                        return false;
                    }
                    *ready = true;
                    true
                });
                if !became_ready {
                    return;
                }
                tracing::info!(prefix = %self.inner.prefix, "shadow ready");
                self.dispatch(ShadowEvent::bare(
                    EventKind::Ready,
                    &self.inner.thing_name,
                    self.shadow_name(),
                ));
                // A Ready handler may have deleted the client.
                if self.is_deleted() {
                    return;
                }
                if let Err(e) = self.request_get().await {
                    tracing::error!(prefix = %self.inner.prefix, error = %e, "initial get failed");
                }
            }
        }
    }

    fn on_message(&self, message: &InboundMessage) -> MqttResult<()> {
        match self.inner.router.route(message) {
            Ok(Routed::Event(event)) => {
                self.dispatch(event);
                Ok(())
            }
            Ok(Routed::Ignored) => {
                tracing::debug!(topic = %message.topic, "ignoring message outside shadow topics");
                Ok(())
            }
            Ok(Routed::Empty(kind)) => {
                tracing::debug!(topic = %message.topic, %kind, "document carries no state, not dispatching");
                Ok(())
            }
            Err(e @ ProtocolError::PartialPayload { .. }) => {
                tracing::error!(
                    topic = %message.topic,
                    error = %e,
                    "partial payload dropped, increase the transport buffer"
                );
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(topic = %message.topic, error = %e, "dropping undecodable payload");
                Ok(())
            }
        }
    }

    fn dispatch(&self, event: ShadowEvent) {
        let delivered = self.inner.dispatcher.dispatch(&event);
        tracing::debug!(kind = %event.kind, delivered, "shadow event dispatched");
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Stop dispatching and refuse further requests.
    ///
    /// Idempotent. A dispatch already in progress runs to completion; the
    /// event being handled then stops before any further subscribe or
    /// request and leaves the client `Disconnected`.
    pub fn delete(&self) {
        if self.inner.deleted.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.dispatcher.clear();
        self.inner.ready.send_replace(false);
        if let Ok(mut coordinator) = self.inner.coordinator.try_lock() {
            coordinator.reset();
        }
        self.inner.shutdown.notify_one();
        tracing::info!(prefix = %self.inner.prefix, "shadow client deleted");
    }
}

impl<C: Channel + 'static> ShadowClient<C> {
    /// Spawn the task that processes transport events in arrival order.
    ///
    /// Returns the sink to hand to the transport driver. The task stops
    /// when the client is deleted or every sink is dropped.
    pub fn start(&self) -> TransportSink {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = client.inner.shutdown.notified() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if let Err(e) = client.handle_event(&event).await {
                            tracing::warn!(
                                prefix = %client.inner.prefix,
                                error = %e,
                                "transport event handling failed"
                            );
                        }
                    }
                }
            }
            tracing::debug!(prefix = %client.inner.prefix, "shadow event loop stopped");
        });

        TransportSink::new(tx)
    }
}
