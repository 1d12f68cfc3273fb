//! Inbound message routing.
//!
//! Turns a raw publish on one of the client's response topics into a typed
//! [`ShadowEvent`], so the client can dispatch without topic string matching.

use ds_protocol::topics;
use ds_protocol::{
    EventKind, ProtocolError, ProtocolResult, ShadowEvent, parse_accepted, parse_delta,
    parse_metadata, parse_rejected,
};

use crate::transport::InboundMessage;

/// Outcome of routing one inbound message.
#[derive(Debug)]
pub enum Routed {
    Event(ShadowEvent),
    /// Topic outside this shadow, or a suffix the client does not handle.
    Ignored,
    /// Well-formed document that carried no state worth reporting.
    Empty(EventKind),
}

/// Routes messages for one shadow (one topic prefix).
#[derive(Debug, Clone)]
pub struct Router {
    prefix: String,
    thing_name: String,
    shadow_name: Option<String>,
    enable_delta: bool,
}

impl Router {
    pub fn new(
        prefix: impl Into<String>,
        thing_name: impl Into<String>,
        shadow_name: Option<String>,
        enable_delta: bool,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            thing_name: thing_name.into(),
            shadow_name,
            enable_delta,
        }
    }

    /// Classify `message` and decode its payload.
    ///
    /// Fails on fragmented payloads and on documents that are not JSON.
    pub fn route(&self, message: &InboundMessage) -> ProtocolResult<Routed> {
        if message.is_partial() {
            return Err(ProtocolError::PartialPayload {
                received: message.payload.len(),
                total: message.total_len,
            });
        }

        let Some(kind) = topics::classify(&self.prefix, &message.topic).and_then(EventKind::for_topic)
        else {
            return Ok(Routed::Ignored);
        };
        if kind == EventKind::UpdateDelta && !self.enable_delta {
            return Ok(Routed::Ignored);
        }

        let payload = &message.payload[..];
        let envelope = match kind {
            EventKind::GetAccepted | EventKind::UpdateAccepted => parse_accepted(payload)?,
            EventKind::UpdateDelta => parse_delta(payload)?,
            EventKind::DeleteAccepted => parse_metadata(payload),
            _ => parse_rejected(payload)?,
        };

        let carries_state = matches!(
            kind,
            EventKind::GetAccepted | EventKind::UpdateAccepted | EventKind::UpdateDelta
        );
        if carries_state && envelope.has_no_state() {
            return Ok(Routed::Empty(kind));
        }

        Ok(Routed::Event(ShadowEvent::from_envelope(
            kind,
            &self.thing_name,
            self.shadow_name.as_deref(),
            envelope,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const PREFIX: &str = "$aws/things/rpi-001/shadow";

    fn router(enable_delta: bool) -> Router {
        Router::new(PREFIX, "rpi-001", None, enable_delta)
    }

    fn message(suffix: &str, payload: &'static str) -> InboundMessage {
        InboundMessage::complete(format!("{PREFIX}/{suffix}"), payload.as_bytes())
    }

    fn event(routed: Routed) -> ShadowEvent {
        match routed {
            Routed::Event(event) => event,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    #[test]
    fn get_accepted_carries_documents() {
        let routed = router(true)
            .route(&message(
                "get/accepted",
                r#"{"state":{"desired":{"led":"on"},"reported":{"led":"off"}},"version":4}"#,
            ))
            .unwrap();
        let event = event(routed);
        assert_eq!(event.kind, EventKind::GetAccepted);
        assert_eq!(event.thing_name, "rpi-001");
        assert_eq!(event.desired.unwrap()["led"], "on");
        assert_eq!(event.reported.unwrap()["led"], "off");
        assert_eq!(event.version, Some(4));
    }

    #[test]
    fn delta_event_and_disabled_delta() {
        let msg = message("update/delta", r#"{"state":{"temp":5},"version":3}"#);
        let event = event(router(true).route(&msg).unwrap());
        assert_eq!(event.kind, EventKind::UpdateDelta);
        assert_eq!(event.delta.unwrap()["temp"], 5);

        assert!(matches!(router(false).route(&msg).unwrap(), Routed::Ignored));
    }

    #[test]
    fn stateless_accepted_is_empty() {
        let routed = router(true)
            .route(&message("update/accepted", r#"{"state":{},"version":9}"#))
            .unwrap();
        assert!(matches!(routed, Routed::Empty(EventKind::UpdateAccepted)));
    }

    #[test]
    fn rejection_always_dispatches() {
        let routed = router(true)
            .route(&message("update/rejected", r#"{"code":409,"message":"Version conflict"}"#))
            .unwrap();
        let event = event(routed);
        assert_eq!(event.kind, EventKind::UpdateRejected);
        let error = event.error.unwrap();
        assert_eq!(error.code, 409);
        assert_eq!(error.message.as_deref(), Some("Version conflict"));
    }

    #[test]
    fn delete_accepted_tolerates_empty_payload() {
        let event = event(router(true).route(&message("delete/accepted", "")).unwrap());
        assert_eq!(event.kind, EventKind::DeleteAccepted);
        assert!(event.version.is_none());
    }

    #[test]
    fn foreign_and_unhandled_topics_are_ignored() {
        let r = router(true);
        let foreign = InboundMessage::complete("$aws/things/other/shadow/get/accepted", "{}");
        assert!(matches!(r.route(&foreign).unwrap(), Routed::Ignored));
        assert!(matches!(r.route(&message("update/documents", "{}")).unwrap(), Routed::Ignored));
        assert!(matches!(r.route(&message("get", "")).unwrap(), Routed::Ignored));
    }

    #[test]
    fn named_shadow_events_carry_shadow_name() {
        let prefix = "$aws/things/rpi-001/shadow/name/config";
        let r = Router::new(prefix, "rpi-001", Some("config".into()), true);
        let msg = InboundMessage::complete(format!("{prefix}/update/delta"), r#"{"state":{"a":1}}"#);
        let event = event(r.route(&msg).unwrap());
        assert_eq!(event.shadow_name.as_deref(), Some("config"));

        // The classic shadow prefix must not swallow named-shadow traffic.
        assert!(matches!(router(true).route(&msg).unwrap(), Routed::Ignored));
    }

    #[test]
    fn partial_payload_is_an_error() {
        let msg = InboundMessage {
            topic: format!("{PREFIX}/get/accepted"),
            payload: Bytes::from_static(b"{\"state\""),
            total_len: 120,
        };
        assert!(matches!(
            router(true).route(&msg),
            Err(ProtocolError::PartialPayload { received: 8, total: 120 })
        ));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let err = router(true)
            .route(&message("get/accepted", "{not json"))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload(_)));
    }
}
