//! Stock shadow event handlers installed by the agent.

use ds_mqtt_channel::{Channel, EventFilter, HandlerId, ShadowClient};
use ds_protocol::{EventKind, ShadowEvent};

/// Event kinds whose documents may carry a delta worth acknowledging.
const DELTA_KINDS: [EventKind; 3] = [
    EventKind::UpdateDelta,
    EventKind::GetAccepted,
    EventKind::UpdateAccepted,
];

/// Register the logging handler and the delta acknowledger on `client`.
///
/// The acknowledger holds a clone of `client`; deleting the client clears
/// its handlers and releases that clone.
pub fn install<C: Channel + 'static>(client: &ShadowClient<C>) -> Vec<HandlerId> {
    let mut ids = vec![client.register_handler(EventFilter::Any, log_event)];
    for kind in DELTA_KINDS {
        let reporter = client.clone();
        ids.push(client.register_handler(kind, move |event: &ShadowEvent| {
            acknowledge_delta(&reporter, event);
        }));
    }
    ids
}

/// Log one event with its thing/shadow name, version and client token.
pub fn log_event(event: &ShadowEvent) {
    let shadow = event.shadow_name.as_deref().unwrap_or("classic");
    match &event.error {
        Some(error) => tracing::warn!(
            kind = %event.kind,
            thing = %event.thing_name,
            shadow,
            code = error.code,
            message = error.message.as_deref().unwrap_or(""),
            client_token = ?event.client_token,
            "shadow request rejected"
        ),
        None => tracing::info!(
            kind = %event.kind,
            thing = %event.thing_name,
            shadow,
            version = ?event.version,
            client_token = ?event.client_token,
            "shadow event"
        ),
    }
}

/// Report a received delta back as reported state, marking it applied.
fn acknowledge_delta<C: Channel + 'static>(client: &ShadowClient<C>, event: &ShadowEvent) {
    let Some(delta) = event.delta.clone() else {
        return;
    };
    let keys: Vec<&str> = delta.keys().map(String::as_str).collect();
    tracing::info!(
        kind = %event.kind,
        version = ?event.version,
        keys = ?keys,
        "applying shadow delta"
    );

    let client = client.clone();
    tokio::spawn(async move {
        if let Err(e) = client.request_update_reported(&delta, None).await {
            tracing::warn!(error = %e, "failed to acknowledge shadow delta");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ds_mqtt_channel::{InboundMessage, MockChannel, ShadowOptions, TransportEvent};
    use serde_json::json;

    const PREFIX: &str = "$aws/things/rpi-001/shadow";

    async fn ready_client() -> (Arc<MockChannel>, ShadowClient<MockChannel>) {
        let mock = Arc::new(MockChannel::new());
        let client =
            ShadowClient::init(Arc::clone(&mock), "rpi-001", None, ShadowOptions::default())
                .unwrap();
        client.handle_event(&TransportEvent::Connected).await.unwrap();
        for sub in mock.subscriptions() {
            client
                .handle_event(&TransportEvent::Subscribed(sub.id))
                .await
                .unwrap();
        }
        mock.reset();
        (mock, client)
    }

    async fn deliver(client: &ShadowClient<MockChannel>, suffix: &str, payload: &'static str) {
        let message = InboundMessage::complete(format!("{PREFIX}/{suffix}"), payload.as_bytes());
        client
            .handle_event(&TransportEvent::Message(message))
            .await
            .unwrap();
        // Let the spawned acknowledgement run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn install_registers_four_handlers() {
        let (_mock, client) = ready_client().await;
        let ids = install(&client);
        assert_eq!(ids.len(), 4);
        assert!(client.unregister_handler(ids[0]));
    }

    #[tokio::test]
    async fn delta_is_reported_back() {
        let (mock, client) = ready_client().await;
        install(&client);

        deliver(&client, "update/delta", r#"{"state":{"led":"on"},"version":7}"#).await;

        let published = mock.published_to(&format!("{PREFIX}/update"));
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].json(), json!({"state": {"reported": {"led": "on"}}}));
    }

    #[tokio::test]
    async fn get_accepted_with_delta_is_reported_back() {
        let (mock, client) = ready_client().await;
        install(&client);

        deliver(
            &client,
            "get/accepted",
            r#"{"state":{"desired":{"fan":2},"reported":{"fan":1},"delta":{"fan":2}},"version":4}"#,
        )
        .await;

        let published = mock.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].json()["state"]["reported"]["fan"], 2);
    }

    #[tokio::test]
    async fn documents_without_delta_publish_nothing() {
        let (mock, client) = ready_client().await;
        install(&client);

        deliver(&client, "update/accepted", r#"{"state":{"reported":{"fan":2}},"version":5}"#).await;
        deliver(&client, "update/rejected", r#"{"code":400,"message":"bad"}"#).await;

        assert!(mock.published().is_empty());
    }
}
