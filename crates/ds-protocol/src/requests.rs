//! Outbound shadow request documents.
//!
//! `get` and `delete` are published with an empty payload; only `update`
//! carries a body.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};

/// Body of an `update` request: `{"state": {...}, "clientToken": ".."}`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRequest<'a> {
    pub state: UpdateState<'a>,
    #[serde(rename = "clientToken", skip_serializing_if = "Option::is_none")]
    pub client_token: Option<&'a str>,
}

/// The `state` object of an update request.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateState<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported: Option<&'a Map<String, Value>>,
}

impl<'a> UpdateRequest<'a> {
    /// Compose an update from the supplied fragments.
    ///
    /// Returns `None` when both `desired` and `reported` are absent or
    /// empty, since such an update would change nothing.
    pub fn new(
        desired: Option<&'a Map<String, Value>>,
        reported: Option<&'a Map<String, Value>>,
        client_token: Option<&'a str>,
    ) -> Option<Self> {
        let is_empty = |fragment: Option<&Map<String, Value>>| fragment.is_none_or(Map::is_empty);
        if is_empty(desired) && is_empty(reported) {
            return None;
        }

        Some(Self {
            state: UpdateState { desired, reported },
            client_token,
        })
    }

    pub fn to_vec(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
    }
}
