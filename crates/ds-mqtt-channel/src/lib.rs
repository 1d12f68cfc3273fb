//! MQTT transport and device shadow client for AWS IoT Core.
//!
//! - `Channel` trait for publish/subscribe (mockable in tests)
//! - `MqttChannel` with TLS (mTLS) for production, driven by [`driver::run`]
//! - `MockChannel` for testing without a broker
//! - `ShadowClient`: subscription readiness, message routing and handler
//!   dispatch for one thing shadow

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod mock;
pub mod router;
pub mod shadows;
pub mod subscriptions;
pub mod tls;
pub mod transport;

// Re-exports for convenience.
pub use channel::{Channel, MqttChannel};
pub use config::{MqttConfig, ShadowOptions};
pub use dispatcher::{EventFilter, Handler, HandlerId};
pub use error::{MqttError, MqttResult};
pub use mock::MockChannel;
pub use shadows::ShadowClient;
pub use subscriptions::SubscriptionState;
pub use transport::{InboundMessage, SubscriptionId, TransportEvent, TransportSink};
