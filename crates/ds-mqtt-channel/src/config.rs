use rumqttc::QoS;
use serde::Deserialize;

use ds_protocol::ProtocolError;
use ds_protocol::topics::DEFAULT_TOPIC_MAX_LEN;

use crate::error::{MqttError, MqttResult};

/// MQTT connection configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// AWS IoT data endpoint, e.g. `abc123-ats.iot.eu-west-1.amazonaws.com`.
    pub broker_host: String,
    /// 8883 for MQTT over TLS, 443 with ALPN.
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// MQTT client ID. May be a thing ARN, from which the thing name is derived.
    pub client_id: String,
    /// When false, connects plaintext (local broker).
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    #[serde(default)]
    pub client_cert_path: String,
    #[serde(default)]
    pub client_key_path: String,
    /// e.g. `AmazonRootCA1.pem`.
    #[serde(default)]
    pub ca_cert_path: String,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// Largest inbound packet accepted by the transport, in bytes.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

fn default_use_tls() -> bool {
    true
}

fn default_port() -> u16 {
    8883
}

fn default_keepalive() -> u16 {
    30
}

fn default_max_packet_size() -> usize {
    // AWS IoT Core message size limit.
    128 * 1024
}

/// Per-shadow client behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShadowOptions {
    /// Subscribe to `update/delta` and deliver `UpdateDelta` events.
    pub enable_delta: bool,
    /// Ceiling for assembled topic strings, in bytes.
    pub max_topic_len: usize,
    /// QoS level for response-topic subscriptions.
    pub subscribe_qos: u8,
    /// QoS level for get/update/delete requests.
    pub publish_qos: u8,
}

impl Default for ShadowOptions {
    fn default() -> Self {
        Self {
            enable_delta: true,
            max_topic_len: DEFAULT_TOPIC_MAX_LEN,
            subscribe_qos: 0,
            publish_qos: 1,
        }
    }
}

/// Map a configured QoS level onto rumqttc's type.
pub fn qos_from_level(level: u8) -> MqttResult<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MqttError::Protocol(ProtocolError::InvalidArgument(format!(
            "unsupported QoS level {other}"
        )))),
    }
}
