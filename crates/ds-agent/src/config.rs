//! Agent configuration, loadable from TOML.

use serde::Deserialize;

use ds_mqtt_channel::{MqttConfig, ShadowOptions};
use ds_protocol::topics;

/// Top-level configuration for the shadow agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// IoT thing name. Derived from `mqtt.client_id` when omitted.
    #[serde(default)]
    pub thing_name: Option<String>,
    /// Named shadow to sync; the classic shadow when omitted.
    #[serde(default)]
    pub shadow_name: Option<String>,
    /// Interval between reported-state updates, in seconds.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub shadow: ShadowOptions,
}

fn default_report_interval() -> u64 {
    30
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Thing name to bind the shadow client to.
    ///
    /// Falls back to the name inside an ARN-style client id, then to the
    /// client id itself.
    pub fn thing_name(&self) -> &str {
        self.thing_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| topics::thing_name_from_client_id(&self.mqtt.client_id))
            .unwrap_or(&self.mqtt.client_id)
    }
}
