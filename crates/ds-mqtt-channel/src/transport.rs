//! Events crossing the boundary between the MQTT transport and shadow clients.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

/// Opaque identifier of one subscribe request, echoed back in
/// [`TransportEvent::Subscribed`] once the broker acknowledges it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One inbound publish as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    /// Full payload size announced by the transport; larger than
    /// `payload.len()` when only a fragment was delivered.
    pub total_len: usize,
}

impl InboundMessage {
    /// A message whose payload arrived in one piece.
    pub fn complete(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            topic: topic.into(),
            total_len: payload.len(),
            payload,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.payload.len() < self.total_len
    }
}

/// Connection-level notification delivered to a shadow client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Subscribed(SubscriptionId),
    Message(InboundMessage),
    /// Transport failure that did not (yet) drop the session.
    Error(String),
}

/// Sending half used by the transport driver to hand events to a client.
///
/// Unbounded so the transport never blocks on a slow consumer.
#[derive(Debug, Clone)]
pub struct TransportSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportSink {
    pub fn new(tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event. Returns `false` once the receiving client has stopped.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Correlates locally issued [`SubscriptionId`]s with MQTT packet ids.
///
/// rumqttc assigns the packet id when the SUBSCRIBE leaves the event loop,
/// so ids wait in FIFO order until the matching outgoing notification
/// binds them, then until the SUBACK resolves them.
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    state: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    next_id: u64,
    queued: VecDeque<SubscriptionId>,
    in_flight: HashMap<u16, SubscriptionId>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a subscribe request about to be handed to the client.
    pub fn enqueue(&self) -> SubscriptionId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = SubscriptionId::new(state.next_id);
        state.queued.push_back(id);
        id
    }

    /// Withdraw an id whose request never reached the event loop.
    pub fn cancel(&self, id: SubscriptionId) {
        self.lock().queued.retain(|queued| *queued != id);
    }

    /// The event loop wrote a SUBSCRIBE with `pkid`.
    pub fn bind(&self, pkid: u16) -> Option<SubscriptionId> {
        let mut state = self.lock();
        let id = state.queued.pop_front()?;
        state.in_flight.insert(pkid, id);
        Some(id)
    }

    /// A SUBACK arrived for `pkid`.
    pub fn acknowledge(&self, pkid: u16) -> Option<SubscriptionId> {
        self.lock().in_flight.remove(&pkid)
    }

    /// Forget requests already on the wire; their acks will never come.
    pub fn connection_lost(&self) {
        self.lock().in_flight.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
