//! Shadow response document decoding.
//!
//! The service answers on three document shapes:
//! - accepted: `{"state": {"desired": {..}, "reported": {..}, "delta": {..}}, "version": N, "clientToken": ".."}`
//! - delta: `{"state": {..}, "version": N}`, with the delta directly under `state`
//! - rejected: `{"code": 400, "message": "..", "clientToken": ".."}`
//!
//! Sub-documents are kept only when they are non-empty objects; anything
//! else is treated as absent. Wrongly typed scalar fields are ignored rather
//! than failing the whole document.

use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};
use crate::shadows::RejectedError;

const STATE: &str = "state";
const DESIRED: &str = "desired";
const REPORTED: &str = "reported";
const DELTA: &str = "delta";
const VERSION: &str = "version";
const CLIENT_TOKEN: &str = "clientToken";
const CODE: &str = "code";
const MESSAGE: &str = "message";

/// Fields extracted from one shadow response document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub desired: Option<Map<String, Value>>,
    pub reported: Option<Map<String, Value>>,
    pub delta: Option<Map<String, Value>>,
    pub version: Option<u64>,
    pub client_token: Option<String>,
    pub error: Option<RejectedError>,
}

impl Envelope {
    /// True when no state sub-document survived decoding.
    pub fn has_no_state(&self) -> bool {
        self.desired.is_none() && self.reported.is_none() && self.delta.is_none()
    }
}

/// Decode a `get/accepted` or `update/accepted` document.
pub fn parse_accepted(payload: &[u8]) -> ProtocolResult<Envelope> {
    let mut root = parse_document(payload)?;
    let mut envelope = metadata(&root);

    if let Some(state) = root.get_mut(STATE) {
        envelope.desired = take_object(state, DESIRED);
        envelope.reported = take_object(state, REPORTED);
        envelope.delta = take_object(state, DELTA);
    }
    Ok(envelope)
}

/// Decode an `update/delta` document.
pub fn parse_delta(payload: &[u8]) -> ProtocolResult<Envelope> {
    let mut root = parse_document(payload)?;
    let mut envelope = metadata(&root);
    envelope.delta = take_object(&mut root, STATE);
    Ok(envelope)
}

/// Decode a `.../rejected` document.
pub fn parse_rejected(payload: &[u8]) -> ProtocolResult<Envelope> {
    let root = parse_document(payload)?;
    let mut envelope = metadata(&root);

    let code = root.get(CODE).and_then(as_integer).unwrap_or(0);
    let message = root.get(MESSAGE).and_then(Value::as_str).map(str::to_string);
    envelope.error = Some(RejectedError { code, message });
    Ok(envelope)
}

/// Best-effort `version`/`clientToken` from a document that may be empty,
/// as on `delete/accepted`.
pub fn parse_metadata(payload: &[u8]) -> Envelope {
    if payload.is_empty() {
        return Envelope::default();
    }
    parse_document(payload)
        .map(|root| metadata(&root))
        .unwrap_or_default()
}

fn parse_document(payload: &[u8]) -> ProtocolResult<Value> {
    serde_json::from_slice(payload).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
}

fn metadata(root: &Value) -> Envelope {
    Envelope {
        version: root.get(VERSION).and_then(as_unsigned),
        client_token: root
            .get(CLIENT_TOKEN)
            .and_then(Value::as_str)
            .map(str::to_string),
        ..Default::default()
    }
}

/// Move `parent[key]` out when it is an object with at least one key.
fn take_object(parent: &mut Value, key: &str) -> Option<Map<String, Value>> {
    match parent.get_mut(key).map(Value::take) {
        Some(Value::Object(map)) if !map.is_empty() => Some(map),
        _ => None,
    }
}

fn as_unsigned(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}

fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
}
