use async_nats::{Client, HeaderMap};
use async_trait::async_trait;
use bytes::Bytes;
use common::CorrelationId;
use futures_util::StreamExt;

use crate::error::{Result, TransportError};
use crate::message::{HEADER_ERROR, HEADER_ORIGIN, Message};
use crate::routing::RoutingTable;
use crate::transport::{SubscribeSettings, Transport};

/// NATS header carrying the correlation id across the wire.
const HEADER_CORRELATION_ID: &str = "Saga-Correlation-Id";

/// NATS header carrying the dispatch type across the wire.
const HEADER_MESSAGE_TYPE: &str = "Saga-Message-Type";

/// Configuration for [`NatsTransport`].
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS connection URL.
    pub url: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
        }
    }
}

/// NATS-backed transport.
///
/// Queues map to NATS subjects. The correlation id and the dispatch
/// type travel in reserved NATS headers alongside the saga headers
/// (`origin`, `error`); the body is the raw payload.
#[derive(Clone)]
pub struct NatsTransport {
    client: Client,
}

impl NatsTransport {
    /// Connects to the broker.
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn to_headers(message: &Message) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_CORRELATION_ID, message.correlation_id.as_str());
        headers.insert(HEADER_MESSAGE_TYPE, message.message_type.as_str());
        for (key, value) in &message.headers {
            headers.insert(key.as_str(), value.as_str());
        }
        headers
    }

    fn from_delivery(delivery: async_nats::Message) -> Message {
        let headers = delivery.headers.unwrap_or_default();
        let get = |key: &str| headers.get(key).map(|v| v.as_str().to_string());

        let mut message = Message::new(
            CorrelationId::from(get(HEADER_CORRELATION_ID).unwrap_or_default()),
            get(HEADER_MESSAGE_TYPE).unwrap_or_default(),
        )
        .with_body(delivery.payload.to_vec());

        for key in [HEADER_ORIGIN, HEADER_ERROR] {
            if let Some(value) = get(key) {
                message = message.with_header(key, value);
            }
        }
        message
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, queue: &str, message: Message) -> Result<()> {
        let headers = Self::to_headers(&message);
        self.client
            .publish_with_headers(queue.to_string(), headers, Bytes::from(message.body))
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn subscribe(&self, handlers: RoutingTable, settings: SubscribeSettings) -> Result<()> {
        let mut subscriber = match settings.queue_group {
            Some(group) => self.client.queue_subscribe(settings.queue.clone(), group).await,
            None => self.client.subscribe(settings.queue.clone()).await,
        }
        .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        tracing::debug!(queue = %settings.queue, "consuming");
        while let Some(delivery) = subscriber.next().await {
            handlers.dispatch(Self::from_delivery(delivery)).await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client
            .drain()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }
}
