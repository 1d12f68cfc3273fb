//! rumqttc event loop driver.
//!
//! Polls the event loop forever, turning raw MQTT events into
//! [`TransportEvent`]s and fanning them out to every registered sink.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet, SubscribeReasonCode,
};

use crate::channel::MqttChannel;
use crate::transport::{InboundMessage, SubscriptionTracker, TransportEvent, TransportSink};

/// Pause between failed polls; rumqttc reconnects on the next poll.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Drive `eventloop` until every sink has closed.
pub async fn run(mut eventloop: EventLoop, channel: &MqttChannel, mut sinks: Vec<TransportSink>) {
    let mut translator = EventTranslator::new(channel.tracker());

    loop {
        let events = match eventloop.poll().await {
            Ok(event) => translator.on_event(&event).into_iter().collect(),
            Err(e) => {
                tracing::error!(
                    error = %describe_connection_error(&e),
                    "MQTT event loop error, reconnecting in 5s"
                );
                let events = translator.on_error(&e);
                fan_out(&mut sinks, events);
                if sinks.is_empty() {
                    break;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        fan_out(&mut sinks, events);
        if sinks.is_empty() {
            break;
        }
    }

    tracing::info!("all shadow clients stopped, MQTT driver exiting");
}

fn fan_out(sinks: &mut Vec<TransportSink>, events: Vec<TransportEvent>) {
    for event in events {
        sinks.retain(|sink| sink.send(event.clone()));
    }
}

/// Stateful mapping from rumqttc events to transport events.
///
/// Tracks whether the session is up so `Disconnected` is reported once per
/// connection, however many errors the reconnect attempts produce.
pub struct EventTranslator {
    tracker: Arc<SubscriptionTracker>,
    connected: bool,
}

impl EventTranslator {
    pub fn new(tracker: Arc<SubscriptionTracker>) -> Self {
        Self {
            tracker,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn on_event(&mut self, event: &Event) -> Option<TransportEvent> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    tracing::info!(session_present = ack.session_present, "MQTT connected");
                    self.connected = true;
                    Some(TransportEvent::Connected)
                } else {
                    Some(TransportEvent::Error(format!(
                        "connection refused: {:?}",
                        ack.code
                    )))
                }
            }
            Event::Incoming(Packet::Publish(publish)) => Some(TransportEvent::Message(
                InboundMessage::complete(publish.topic.clone(), publish.payload.clone()),
            )),
            Event::Incoming(Packet::SubAck(ack)) => {
                let id = self.tracker.acknowledge(ack.pkid)?;
                let refused = ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                if refused {
                    tracing::warn!(pkid = ack.pkid, subscription = %id, "broker refused subscription");
                    return None;
                }
                Some(TransportEvent::Subscribed(id))
            }
            Event::Incoming(Packet::Disconnect) => self.connection_lost(),
            Event::Outgoing(Outgoing::Subscribe(pkid)) => {
                if self.tracker.bind(*pkid).is_none() {
                    tracing::debug!(pkid, "outgoing subscribe without a tracked request");
                }
                None
            }
            _ => None,
        }
    }

    pub fn on_error(&mut self, error: &ConnectionError) -> Vec<TransportEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(disconnected) = self.connection_lost() {
            events.push(disconnected);
        }
        events.push(TransportEvent::Error(describe_connection_error(error)));
        events
    }

    fn connection_lost(&mut self) -> Option<TransportEvent> {
        if !self.connected {
            return None;
        }
        self.connected = false;
        self.tracker.connection_lost();
        tracing::warn!("MQTT connection lost");
        Some(TransportEvent::Disconnected)
    }
}

/// Human-readable summary of a poll failure.
pub fn describe_connection_error(error: &ConnectionError) -> String {
    match error {
        ConnectionError::Io(e) => format!("network I/O failed: {e}"),
        ConnectionError::ConnectionRefused(code) => format!("broker refused connection: {code:?}"),
        ConnectionError::NetworkTimeout => "network timeout".to_string(),
        ConnectionError::RequestsDone => "client dropped, no more requests".to_string(),
        other => other.to_string(),
    }
}
