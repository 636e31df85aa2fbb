//! In-process broker backed by unbounded tokio channels.
//!
//! One receiver per topic is shared by every subscription, so a consumer that
//! resubscribes picks up where the previous stream stopped. Nacked deliveries
//! are queued again under the same id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::cache::mutex_lock;

use super::broker::{Acknowledger, Broker, BrokerError, Delivery, Subscription};

const SOURCE: &str = "events::memory";

type Envelope = (String, Bytes);

struct Topic {
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<Envelope>>>,
    /// Payloads handed out and not yet settled, by delivery id.
    in_flight: Arc<Mutex<HashMap<String, Bytes>>>,
    acked: Arc<AtomicU64>,
}

impl Topic {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            acked: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[derive(Default)]
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, Topic>>,
    next_id: AtomicU64,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries settled with `ack` on `topic`.
    pub fn acked(&self, topic: &str) -> u64 {
        mutex_lock(&self.topics, SOURCE, "acked")
            .get(topic)
            .map(|t| t.acked.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Deliveries handed to a subscriber and not yet settled.
    pub fn in_flight(&self, topic: &str) -> usize {
        mutex_lock(&self.topics, SOURCE, "in_flight")
            .get(topic)
            .map(|t| mutex_lock(&*t.in_flight, SOURCE, "in_flight").len())
            .unwrap_or(0)
    }

    fn with_topic<R>(&self, topic: &str, f: impl FnOnce(&Topic) -> R) -> R {
        let mut topics = mutex_lock(&self.topics, SOURCE, "topic");
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(Topic::new);
        f(entry)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.with_topic(topic, |t| t.sender.send((id, payload)))
            .map_err(|_| BrokerError::Closed {
                topic: topic.to_string(),
            })
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        let (receiver, sender, in_flight, acked) = self.with_topic(topic, |t| {
            (
                t.receiver.clone(),
                t.sender.clone(),
                t.in_flight.clone(),
                t.acked.clone(),
            )
        });

        let topic: Arc<str> = Arc::from(topic);
        let stream = futures::stream::unfold(receiver, move |receiver| {
            let topic = topic.clone();
            let sender = sender.clone();
            let in_flight = in_flight.clone();
            let acked = acked.clone();
            async move {
                let next = receiver.lock().await.recv().await;
                let (id, payload) = next?;
                mutex_lock(&*in_flight, SOURCE, "deliver").insert(id.clone(), payload.clone());
                let acker = MemoryAcker {
                    topic,
                    sender,
                    in_flight,
                    acked,
                };
                Some((Ok(Delivery::new(id, payload, Box::new(acker))), receiver))
            }
        });

        Ok(stream.boxed())
    }
}

struct MemoryAcker {
    topic: Arc<str>,
    sender: mpsc::UnboundedSender<Envelope>,
    in_flight: Arc<Mutex<HashMap<String, Bytes>>>,
    acked: Arc<AtomicU64>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self, delivery_id: &str) -> Result<(), BrokerError> {
        mutex_lock(&*self.in_flight, SOURCE, "ack").remove(delivery_id);
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, delivery_id: &str) -> Result<(), BrokerError> {
        let payload = mutex_lock(&*self.in_flight, SOURCE, "nack").remove(delivery_id);
        match payload {
            Some(payload) => self
                .sender
                .send((delivery_id.to_string(), payload))
                .map_err(|_| BrokerError::Closed {
                    topic: self.topic.to_string(),
                }),
            None => Ok(()),
        }
    }
}
