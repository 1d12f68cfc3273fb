//! Periodic reported-state publisher.
//!
//! Reports a small device document at a configurable interval so the cloud
//! copy of the shadow reflects that the device is alive.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{self, Instant, MissedTickBehavior};

use ds_mqtt_channel::{Channel, ShadowClient};

/// Reported state published on every tick.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    /// Unix seconds at capture time.
    pub now: i64,
    pub uptime_secs: u64,
    pub agent_version: &'static str,
}

impl DeviceReport {
    pub fn capture(start_time: Instant) -> Self {
        Self {
            now: Utc::now().timestamp(),
            uptime_secs: start_time.elapsed().as_secs(),
            agent_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Run the report loop forever, reporting every `interval`.
///
/// The first tick fires immediately; ticks while the client is not ready
/// are skipped.
pub async fn run<C: Channel>(client: &ShadowClient<C>, interval: Duration, start_time: Instant) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        report_state(client, start_time).await;
    }
}

/// Publish one report. Returns whether an update was sent.
pub async fn report_state<C: Channel>(client: &ShadowClient<C>, start_time: Instant) -> bool {
    if !client.is_ready() {
        tracing::debug!(prefix = %client.topic_prefix(), "shadow not ready, skipping report");
        return false;
    }

    let report = DeviceReport::capture(start_time);
    let Ok(Value::Object(reported)) = serde_json::to_value(&report) else {
        tracing::error!("failed to serialize device report");
        return false;
    };

    match client.request_update_reported(&reported, None).await {
        Ok(()) => {
            tracing::debug!(uptime_secs = report.uptime_secs, "device state reported");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to publish device report");
            false
        }
    }
}
