//! MQTT channel error types.

use thiserror::Error;

use ds_protocol::ProtocolError;

/// Errors that can occur during MQTT and shadow operations.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("shadow client has been deleted")]
    Closed,
}

/// Convenience alias for MQTT results.
pub type MqttResult<T> = Result<T, MqttError>;
