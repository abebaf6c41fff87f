use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use wattsim::BrokerConnection;
use wattsim_common::DeviceIdentity;

/// Receives operator configuration messages on the device's `config`
/// channel.
///
/// The subscription handler only forwards payloads into a channel;
/// parsing and the registration transition happen on the consumer side
/// so a malformed payload never takes the dispatch loop down.
pub struct RegistrationListener {
    rx: UnboundedReceiver<serde_json::Value>,
}

impl RegistrationListener {
    pub async fn subscribe(
        conn: &BrokerConnection,
        identity: &DeviceIdentity,
    ) -> wattsim::Result<Self> {
        let (tx, rx) = unbounded_channel();

        conn.subscribe_with_handler(
            identity.config_topic(),
            Box::new(move |event| tx.send(event.payload).is_ok()),
        )
        .await?;

        Ok(Self { rx })
    }

    /// Next inbound payload; `None` once the connection's dispatch loop
    /// has dropped the handler.
    pub async fn next(&mut self) -> Option<serde_json::Value> {
        self.rx.recv().await
    }
}
