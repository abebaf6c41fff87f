use core::{convert::Infallible, str::FromStr as _, sync::atomic::AtomicU16};
use std::{collections::BTreeMap, sync::Arc};

use mqtt_endpoint_tokio::mqtt_ep::{
    self, Endpoint,
    packet::v5_0,
    role,
    transport::{TcpTransport, connect_helper},
};
use mqtt_protocol_core::mqtt::packet::{
    Property, Qos, SubEntry, SubOpts, SubscriptionIdentifier,
    v5_0::{Connack, Publish},
};
use serde::Serialize;
use tokio::sync::Mutex;
use wattsim_common::Topic;

pub mod log;

pub use wattsim_common as common;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("mqtt transport error: {0}")]
    MqttTransport(#[from] mqtt_ep::TransportError),
    #[error("mqtt connection error: {0}")]
    MqttConnection(#[from] mqtt_ep::ConnectionError),
    #[error("mqtt packet field error: {0}")]
    MqttPacketField(&'static str),
    #[error("mqtt packet error: {0}")]
    MqttPacket(mqtt_ep::result_code::MqttError),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("bad topic: {0}")]
    BadTopic(&'static str),
}

impl From<mqtt_ep::result_code::MqttError> for Error {
    fn from(e: mqtt_ep::result_code::MqttError) -> Self {
        Error::MqttPacket(e)
    }
}

/// Username/password pair for brokers that require authentication.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub(crate) type SubscriptionHandler = Box<dyn FnMut(PublishEvent) -> bool + Send + Sync>;

pub struct BrokerConnection {
    endpoint: Endpoint<role::Client>,
    next_payload_id: AtomicU16,
    // key could be SubscriptionIdentifier if it implemented Ord
    sub_handlers: Mutex<BTreeMap<u32, SubscriptionHandler>>,
}

impl BrokerConnection {
    pub async fn connect(
        client_id: &str,
        addr: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<Self>> {
        // Create a client endpoint
        let endpoint = mqtt_ep::endpoint::Endpoint::<role::Client>::new(mqtt_ep::Version::V5_0);

        // Connect to TCP transport
        let tcp_stream = connect_helper::connect_tcp(addr, None).await?;
        let transport = TcpTransport::from_stream(tcp_stream);
        endpoint
            .attach(transport, mqtt_ep::endpoint::Mode::Client)
            .await?;

        // Send CONNECT packet
        let mut connect = v5_0::Connect::builder().client_id(client_id)?;

        if let Some(credentials) = credentials {
            connect = connect
                .user_name(credentials.username.as_str())?
                .password(credentials.password.as_bytes().to_vec())?;
        }

        let connect = connect.build()?;

        endpoint.send(connect).await?;

        // Receive CONNACK
        let packet = endpoint.recv().await?;
        let connack: Connack = packet.try_into().map_err(Error::MqttPacketField)?;
        tracing::debug!("Received CONNACK: {connack:?}");

        Ok(BrokerConnection {
            endpoint,
            next_payload_id: AtomicU16::new(1),
            sub_handlers: Mutex::new(BTreeMap::new()),
        }
        .into())
    }

    fn next_payload_id(&self) -> u16 {
        loop {
            let id = self
                .next_payload_id
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            if id != 0 {
                break id;
            }
        }
    }

    fn next_subscription_id(&self) -> SubscriptionIdentifier {
        // max value is 2^28 - 1 (min value is also 1)
        SubscriptionIdentifier::new(self.next_payload_id() as u32).unwrap()
    }

    pub async fn recv_raw(&self) -> Result<mqtt_ep::packet::Packet> {
        let packet = self.endpoint.recv().await?;
        Ok(packet)
    }

    pub async fn recv(&self) -> Result<PublishEvent> {
        loop {
            let packet = self.recv_raw().await?;

            let publish: Result<Publish, _> = packet.try_into();
            if let Ok(publish) = publish {
                let sub_id = publish.props.iter().find_map(|p| {
                    if let Property::SubscriptionIdentifier(id) = p {
                        Some(id.clone())
                    } else {
                        None
                    }
                });

                let topic = Topic::from_str(publish.topic_name()).map_err(Error::BadTopic)?;

                let payload: serde_json::Value =
                    serde_json::from_slice(publish.payload().as_slice())?;

                break Ok(PublishEvent { sub_id, topic, payload });
            }
        }
    }

    /// Dispatch loop: receives publishes and feeds them to the handler
    /// registered for their subscription, until the transport fails.
    /// Messages that fail to decode are discarded, not fatal.
    pub async fn handle(&self) -> Result<Infallible> {
        loop {
            let event = match self.recv().await {
                Ok(event) => event,
                Err(err @ (Error::SerdeJson(_) | Error::BadTopic(_))) => {
                    tracing::warn!("Discarding undecodable publish: {err}");
                    continue;
                }
                Err(err) => return Err(err),
            };

            tracing::debug!("Handling publish event: {event:#?}");

            if let Some(sub_id) = event.sub_id.clone() {
                let mut handlers = self.sub_handlers.lock().await;

                if let Some(handler) = handlers.get_mut(&sub_id.val()) {
                    let retain = handler(event);

                    if !retain {
                        tracing::warn!("Removing subscription handler for ID {}", sub_id.val());
                        handlers.remove(&sub_id.val());
                    }
                }
            }
        }
    }

    pub async fn raw_subscribe(&self, topic: &str) -> Result<SubscriptionIdentifier> {
        let sub_id = self.next_subscription_id();

        let subscribe = v5_0::Subscribe::builder()
            .packet_id(self.next_payload_id())
            .props(vec![Property::SubscriptionIdentifier(sub_id.clone())])
            .entries(vec![SubEntry::new(
                topic.to_string(),
                SubOpts::new().set_qos(Qos::AtLeastOnce),
            )?])
            .build()?;

        tracing::info!("Subscribing to topic '{topic}'");

        self.endpoint
            .register_packet_id(subscribe.packet_id())
            .await?;

        self.endpoint.send(subscribe).await?;

        Ok(sub_id)
    }

    pub async fn subscribe(&self, topic: Topic) -> Result<SubscriptionIdentifier> {
        self.raw_subscribe(&topic.to_string()).await
    }

    pub async fn subscribe_with_handler(
        &self,
        topic: Topic,
        handler: SubscriptionHandler,
    ) -> Result<()> {
        let sub_id = self.subscribe(topic).await?;

        let mut handlers = self.sub_handlers.lock().await;
        handlers.insert(sub_id.val(), handler);

        Ok(())
    }

    pub async fn publish(
        &self,
        topic: Topic,
        payload: impl Serialize,
        opts: PublishOpts,
    ) -> Result<()> {
        let payload = serde_json::to_string(&payload)?;

        tracing::debug!("Publishing to topic {topic}: {payload}");

        let publish = v5_0::Publish::builder()
            .topic_name(topic.to_string())?
            .payload(payload)
            .qos(opts.qos)
            .retain(opts.retain)
            .packet_id(self.next_payload_id())
            .build()?;

        tracing::debug!("Publishing MQTT message: {publish:#?}");

        self.endpoint
            .register_packet_id(publish.packet_id().unwrap())
            .await?;

        self.endpoint.send(publish).await?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PublishEvent {
    pub sub_id: Option<SubscriptionIdentifier>,
    pub topic: Topic,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy)]
pub struct PublishOpts {
    pub qos: Qos,
    pub retain: bool,
}

impl PublishOpts {
    pub const fn announcement() -> Self {
        Self { qos: Qos::AtLeastOnce, retain: false }
    }

    pub const fn telemetry() -> Self {
        Self { qos: Qos::AtLeastOnce, retain: false }
    }
}
