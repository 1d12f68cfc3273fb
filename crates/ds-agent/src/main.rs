//! Device shadow agent: keeps one thing shadow in sync with AWS IoT Core.
//!
//! Connects over MQTT, acknowledges deltas by reporting them back and
//! periodically reports a small device document.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use ds_agent::config::AgentConfig;
use ds_agent::{handlers, reporter};
use ds_mqtt_channel::{MqttChannel, ShadowClient, driver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ds-agent starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/ds-agent/agent.toml".to_string());

    let config = AgentConfig::from_file(&config_path)?;
    let thing_name = config.thing_name().to_string();
    tracing::info!(
        thing = %thing_name,
        shadow = config.shadow_name.as_deref().unwrap_or("classic"),
        "config loaded"
    );

    // ── MQTT channel ────────────────────────────────────────────
    let (channel, eventloop) = MqttChannel::new(&config.mqtt)?;
    let channel = Arc::new(channel);

    // ── Shadow client ───────────────────────────────────────────
    let client = ShadowClient::init(
        Arc::clone(&channel),
        &thing_name,
        config.shadow_name.as_deref(),
        config.shadow.clone(),
    )?;
    handlers::install(&client);
    let sink = client.start();

    let start_time = tokio::time::Instant::now();
    tracing::info!(prefix = %client.topic_prefix(), "ds-agent ready");

    tokio::select! {
        // Drive the MQTT event loop and feed the shadow client
        () = driver::run(eventloop, &channel, vec![sink]) => {
            tracing::error!("MQTT driver exited unexpectedly");
        }
        // Periodic reported-state updates
        () = reporter::run(
            &client,
            Duration::from_secs(config.report_interval_secs),
            start_time,
        ) => {
            tracing::error!("reporter loop exited unexpectedly");
        }
        // Graceful shutdown on SIGINT
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    client.delete();
    if let Err(e) = channel.disconnect().await {
        tracing::warn!(error = %e, "MQTT disconnect failed");
    }

    tracing::info!("ds-agent stopped");
    Ok(())
}
