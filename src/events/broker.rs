//! Broker port: publish bytes to a topic, subscribe to a stream of deliveries.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable during {op}: {message}")]
    Unavailable { op: &'static str, message: String },
    #[error("subscription to `{topic}` closed")]
    Closed { topic: String },
}

impl BrokerError {
    pub fn unavailable(op: &'static str, err: impl fmt::Display) -> Self {
        Self::Unavailable {
            op,
            message: err.to_string(),
        }
    }
}

pub type Subscription = BoxStream<'static, Result<Delivery, BrokerError>>;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Returns once the broker has accepted the message.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Deliveries are at-least-once: anything not acked may be delivered again.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError>;
}

/// Settles a delivery with the broker that produced it.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, delivery_id: &str) -> Result<(), BrokerError>;

    /// Hand the message back for redelivery.
    async fn nack(&self, delivery_id: &str) -> Result<(), BrokerError>;
}

pub struct Delivery {
    id: String,
    payload: Bytes,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(id: impl Into<String>, payload: Bytes, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            id: id.into(),
            payload,
            acker,
        }
    }

    /// Broker-assigned id, stable across redeliveries of the same message.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack(&self.id).await
    }

    pub async fn nack(self) -> Result<(), BrokerError> {
        self.acker.nack(&self.id).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
