//! MQTT topic builders and parsers for the AWS IoT shadow topic hierarchy.
//!
//! Topic structure:
//! ```text
//! $aws/things/{thing}/shadow/get
//! $aws/things/{thing}/shadow/get/accepted
//! $aws/things/{thing}/shadow/get/rejected
//! $aws/things/{thing}/shadow/update
//! $aws/things/{thing}/shadow/update/accepted
//! $aws/things/{thing}/shadow/update/rejected
//! $aws/things/{thing}/shadow/update/delta
//! $aws/things/{thing}/shadow/update/documents
//! $aws/things/{thing}/shadow/delete
//! $aws/things/{thing}/shadow/delete/accepted
//! $aws/things/{thing}/shadow/delete/rejected
//! ```
//!
//! Named shadows insert `/name/{shadow}` after `shadow`.

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// Longest thing name accepted by AWS IoT, in bytes.
pub const THING_NAME_MAX_LEN: usize = 127;

/// Longest named-shadow name accepted by AWS IoT, in bytes.
pub const SHADOW_NAME_MAX_LEN: usize = 63;

/// Default ceiling for an assembled topic, in bytes.
pub const DEFAULT_TOPIC_MAX_LEN: usize = 256;

const THING_ARN_MARKER: &str = ":thing/";

// ─── Operations & suffixes ───

/// Shadow operation, the first path segment after the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Get,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "get" => Some(Self::Get),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response suffix published by the service after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Suffix {
    Accepted,
    Rejected,
    Delta,
    Documents,
}

impl Suffix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Delta => "delta",
            Self::Documents => "documents",
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "delta" => Some(Self::Delta),
            "documents" => Some(Self::Documents),
            _ => None,
        }
    }
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation plus optional response suffix, relative to a shadow prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowTopic {
    pub operation: Operation,
    pub suffix: Option<Suffix>,
}

impl ShadowTopic {
    pub const fn new(operation: Operation, suffix: Option<Suffix>) -> Self {
        Self { operation, suffix }
    }

    pub const fn response(operation: Operation, suffix: Suffix) -> Self {
        Self::new(operation, Some(suffix))
    }
}

impl fmt::Display for ShadowTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.suffix {
            Some(suffix) => write!(f, "{}/{}", self.operation, suffix),
            None => write!(f, "{}", self.operation),
        }
    }
}

/// Response topics a client must be subscribed to before it is ready,
/// in the order the subscriptions are issued.
pub fn response_topics(enable_delta: bool) -> Vec<ShadowTopic> {
    let mut topics = vec![
        ShadowTopic::response(Operation::Get, Suffix::Accepted),
        ShadowTopic::response(Operation::Get, Suffix::Rejected),
        ShadowTopic::response(Operation::Update, Suffix::Accepted),
        ShadowTopic::response(Operation::Update, Suffix::Rejected),
    ];
    if enable_delta {
        topics.push(ShadowTopic::response(Operation::Update, Suffix::Delta));
    }
    topics.push(ShadowTopic::response(Operation::Delete, Suffix::Accepted));
    topics.push(ShadowTopic::response(Operation::Delete, Suffix::Rejected));
    topics
}

// ─── Topic building ───

/// Derive the topic prefix for a classic (`shadow_name` absent or empty)
/// or named shadow.
pub fn derive_prefix(thing_name: &str, shadow_name: Option<&str>) -> ProtocolResult<String> {
    validate_name("thing name", thing_name, THING_NAME_MAX_LEN)?;

    match shadow_name.filter(|name| !name.is_empty()) {
        None => Ok(format!("$aws/things/{thing_name}/shadow")),
        Some(shadow_name) => {
            validate_name("shadow name", shadow_name, SHADOW_NAME_MAX_LEN)?;
            Ok(format!("$aws/things/{thing_name}/shadow/name/{shadow_name}"))
        }
    }
}

fn validate_name(what: &str, name: &str, max_len: usize) -> ProtocolResult<()> {
    if name.is_empty() {
        return Err(ProtocolError::InvalidArgument(format!("{what} must not be empty")));
    }
    if name.len() > max_len {
        return Err(ProtocolError::InvalidArgument(format!(
            "{what} is {} bytes, limit is {max_len}",
            name.len()
        )));
    }
    // Separators and wildcards would break prefix matching on inbound topics.
    if name.contains(['/', '+', '#']) {
        return Err(ProtocolError::InvalidArgument(format!(
            "{what} '{name}' contains a topic separator or wildcard"
        )));
    }
    Ok(())
}

/// Assemble `{prefix}/{operation}[/{suffix}]`, refusing results longer
/// than `max_len` bytes.
pub fn topic_for(
    prefix: &str,
    operation: Operation,
    suffix: Option<Suffix>,
    max_len: usize,
) -> ProtocolResult<String> {
    let topic = match suffix {
        Some(suffix) => format!("{prefix}/{operation}/{suffix}"),
        None => format!("{prefix}/{operation}"),
    };
    if topic.len() > max_len {
        return Err(ProtocolError::TopicTooLong {
            len: topic.len(),
            max: max_len,
        });
    }
    Ok(topic)
}

// ─── Topic parsing ───

/// Classify an inbound topic relative to `prefix`.
///
/// Returns `None` for topics outside the prefix, unknown operations,
/// unknown suffixes and anything nested deeper than one suffix segment.
pub fn classify(prefix: &str, topic: &str) -> Option<ShadowTopic> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;

    let (operation, suffix) = match rest.split_once('/') {
        Some((operation, suffix)) => (operation, Some(suffix)),
        None => (rest, None),
    };

    let operation = Operation::parse(operation)?;
    let suffix = match suffix {
        Some(segment) => Some(Suffix::parse(segment)?),
        None => None,
    };

    Some(ShadowTopic { operation, suffix })
}

/// Extract the thing name from an ARN-style client id
/// (`arn:aws:iot:region:account:thing/{name}`).
pub fn thing_name_from_client_id(client_id: &str) -> Option<&str> {
    let start = client_id.find(THING_ARN_MARKER)? + THING_ARN_MARKER.len();
    let name = &client_id[start..];
    (!name.is_empty()).then_some(name)
}
