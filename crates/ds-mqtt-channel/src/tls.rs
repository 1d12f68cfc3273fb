//! Transport selection for AWS IoT Core connections.
//!
//! Mutual TLS reads three PEM files: the Amazon root CA, the device
//! certificate and its private key. Port 443 additionally needs the
//! `x-amzn-mqtt-ca` ALPN protocol to reach the MQTT listener.

use std::path::Path;

use rumqttc::{TlsConfiguration, Transport};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

const ALPN_PORT: u16 = 443;
const AWS_IOT_ALPN: &[u8] = b"x-amzn-mqtt-ca";

/// Pick the transport described by `config`.
pub fn transport_for(config: &MqttConfig) -> MqttResult<Transport> {
    if !config.use_tls {
        tracing::warn!(host = %config.broker_host, "TLS disabled, connecting plaintext");
        return Ok(Transport::Tcp);
    }

    let ca = read_pem("CA cert", &config.ca_cert_path)?;
    let client_cert = read_pem("client cert", &config.client_cert_path)?;
    let client_key = read_pem("client key", &config.client_key_path)?;

    let alpn = (config.broker_port == ALPN_PORT).then(|| vec![AWS_IOT_ALPN.to_vec()]);

    Ok(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn,
        client_auth: Some((client_cert, client_key)),
    }))
}

fn read_pem(what: &str, path: &str) -> MqttResult<Vec<u8>> {
    if path.is_empty() {
        return Err(MqttError::Tls(format!("{what} path is not configured")));
    }
    std::fs::read(Path::new(path))
        .map_err(|e| MqttError::Tls(format!("failed to read {what} '{path}': {e}")))
}
