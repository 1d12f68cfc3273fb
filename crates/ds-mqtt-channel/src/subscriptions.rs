//! Response-topic subscription bookkeeping.
//!
//! A client becomes ready only once the broker has acknowledged every
//! response topic for the current connection. Acknowledgements may arrive
//! in any order; stale or unknown ones are ignored.

use std::collections::{BTreeSet, HashMap};

use ds_protocol::topics::{self, ShadowTopic};

use crate::transport::SubscriptionId;

/// Readiness of a shadow client's response subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Disconnected,
    /// Waiting on the topics still in `pending`.
    Subscribing { pending: BTreeSet<ShadowTopic> },
    Ready,
}

/// Result of feeding one acknowledgement to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Not one of the requests issued for this connection.
    Ignored,
    /// Recorded; this many topics are still outstanding.
    Pending(usize),
    /// The last outstanding topic; the client just became ready.
    Ready,
}

pub(crate) struct SubscriptionCoordinator {
    topics: Vec<ShadowTopic>,
    requests: HashMap<SubscriptionId, ShadowTopic>,
    state: SubscriptionState,
}

impl SubscriptionCoordinator {
    pub(crate) fn new(enable_delta: bool) -> Self {
        Self {
            topics: topics::response_topics(enable_delta),
            requests: HashMap::new(),
            state: SubscriptionState::Disconnected,
        }
    }

    pub(crate) fn state(&self) -> &SubscriptionState {
        &self.state
    }

    /// Topics to subscribe, in issue order.
    pub(crate) fn topics(&self) -> &[ShadowTopic] {
        &self.topics
    }

    /// Start a fresh round for a new connection.
    pub(crate) fn begin(&mut self) {
        self.requests.clear();
        self.state = SubscriptionState::Subscribing {
            pending: self.topics.iter().copied().collect(),
        };
    }

    /// Remember which topic a subscribe request was for.
    pub(crate) fn record_request(&mut self, id: SubscriptionId, topic: ShadowTopic) {
        self.requests.insert(id, topic);
    }

    pub(crate) fn acknowledge(&mut self, id: SubscriptionId) -> Acknowledgement {
        let SubscriptionState::Subscribing { pending } = &mut self.state else {
            return Acknowledgement::Ignored;
        };
        let Some(topic) = self.requests.remove(&id) else {
            return Acknowledgement::Ignored;
        };
        if !pending.remove(&topic) {
            return Acknowledgement::Ignored;
        }
        if pending.is_empty() {
            self.state = SubscriptionState::Ready;
            return Acknowledgement::Ready;
        }
        Acknowledgement::Pending(pending.len())
    }

    pub(crate) fn reset(&mut self) {
        self.requests.clear();
        self.state = SubscriptionState::Disconnected;
    }
}
