use std::fmt;

use serde_json::{Map, Value};

use crate::envelope::Envelope;
use crate::topics::{Operation, ShadowTopic, Suffix};

/// Kind of a shadow event delivered to handlers.
///
/// `Error` is also the error family: a handler registered for `Error`
/// receives every `*Rejected` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// All response topics are subscribed.
    Ready,
    /// The transport dropped the connection.
    Disconnected,
    /// The service rejected a request.
    Error,
    GetAccepted,
    GetRejected,
    UpdateAccepted,
    UpdateRejected,
    /// Desired state diverged from reported state.
    UpdateDelta,
    DeleteAccepted,
    DeleteRejected,
}

impl EventKind {
    /// Whether this kind belongs to the error family.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::Error | Self::GetRejected | Self::UpdateRejected | Self::DeleteRejected
        )
    }

    /// Event kind produced by a message on `topic`, if any.
    pub fn for_topic(topic: ShadowTopic) -> Option<Self> {
        match (topic.operation, topic.suffix?) {
            (Operation::Get, Suffix::Accepted) => Some(Self::GetAccepted),
            (Operation::Get, Suffix::Rejected) => Some(Self::GetRejected),
            (Operation::Update, Suffix::Accepted) => Some(Self::UpdateAccepted),
            (Operation::Update, Suffix::Rejected) => Some(Self::UpdateRejected),
            (Operation::Update, Suffix::Delta) => Some(Self::UpdateDelta),
            (Operation::Delete, Suffix::Accepted) => Some(Self::DeleteAccepted),
            (Operation::Delete, Suffix::Rejected) => Some(Self::DeleteRejected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::GetAccepted => "get_accepted",
            Self::GetRejected => "get_rejected",
            Self::UpdateAccepted => "update_accepted",
            Self::UpdateRejected => "update_rejected",
            Self::UpdateDelta => "update_delta",
            Self::DeleteAccepted => "delete_accepted",
            Self::DeleteRejected => "delete_rejected",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body of a `.../rejected` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedError {
    /// HTTP-style status code, `0` when the document carried none.
    pub code: i64,
    pub message: Option<String>,
}

/// One shadow occurrence, passed by reference to every matching handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowEvent {
    pub kind: EventKind,
    pub thing_name: String,
    /// `None` for the classic shadow.
    pub shadow_name: Option<String>,
    /// Non-empty `state.desired` object.
    pub desired: Option<Map<String, Value>>,
    /// Non-empty `state.reported` object.
    pub reported: Option<Map<String, Value>>,
    /// Non-empty delta object.
    pub delta: Option<Map<String, Value>>,
    pub version: Option<u64>,
    pub client_token: Option<String>,
    /// Present only on error-family events.
    pub error: Option<RejectedError>,
}

impl ShadowEvent {
    /// An event carrying no document, such as `Ready` or `Disconnected`.
    pub fn bare(kind: EventKind, thing_name: &str, shadow_name: Option<&str>) -> Self {
        Self {
            kind,
            thing_name: thing_name.to_string(),
            shadow_name: shadow_name.map(str::to_string),
            desired: None,
            reported: None,
            delta: None,
            version: None,
            client_token: None,
            error: None,
        }
    }

    /// An event populated from a decoded envelope.
    pub fn from_envelope(
        kind: EventKind,
        thing_name: &str,
        shadow_name: Option<&str>,
        envelope: Envelope,
    ) -> Self {
        Self {
            desired: envelope.desired,
            reported: envelope.reported,
            delta: envelope.delta,
            version: envelope.version,
            client_token: envelope.client_token,
            error: envelope.error,
            ..Self::bare(kind, thing_name, shadow_name)
        }
    }
}
