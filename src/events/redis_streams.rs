//! Redis Streams broker.
//!
//! Publishing is `XADD topic * payload <bytes>`. Subscribers join a consumer
//! group (`XGROUP CREATE ... MKSTREAM`, existing groups are reused) and read with
//! `XREADGROUP`: first this consumer's pending backlog, then new entries.
//! Entries stay pending until `XACK`, so a crash between receive and ack leads
//! to redelivery on the next subscribe.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use tracing::{debug, info};

use super::broker::{Acknowledger, Broker, BrokerError, Delivery, Subscription};

const SOURCE: &str = "events::redis_streams";
const PAYLOAD_FIELD: &str = "payload";
const BACKLOG_START: &str = "0";
const NEW_ENTRIES: &str = ">";

#[derive(Debug, Clone)]
pub struct StreamConsumerConfig {
    pub group: String,
    pub consumer: String,
    pub block: Duration,
    pub batch_size: usize,
}

#[derive(Clone)]
pub struct RedisStreamBroker {
    client: redis::Client,
    conn: ConnectionManager,
    consumer: StreamConsumerConfig,
}

impl RedisStreamBroker {
    pub async fn connect(url: &str, consumer: StreamConsumerConfig) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url).map_err(|e| BrokerError::unavailable("connect", e))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BrokerError::unavailable("connect", e))?;
        Ok(Self {
            client,
            conn,
            consumer,
        })
    }

    async fn ensure_group(&self, topic: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(topic, &self.consumer.group, BACKLOG_START)
            .await;
        match created {
            Ok(()) => {
                info!(
                    target = SOURCE,
                    topic,
                    group = %self.consumer.group,
                    "Consumer group created"
                );
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(BrokerError::unavailable("xgroup_create", err)),
        }
    }
}

#[async_trait]
impl Broker for RedisStreamBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(topic, "*", &[(PAYLOAD_FIELD, payload.as_ref())])
            .await
            .map_err(|e| BrokerError::unavailable("xadd", e))?;
        debug!(target = SOURCE, topic, entry_id = %id, "Stream entry appended");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        self.ensure_group(topic).await?;

        // Blocking reads get their own connection so acks and publishes on the
        // shared one never queue behind them.
        let reader = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| BrokerError::unavailable("connect", e))?;

        let state = ReadState {
            reader,
            acker_conn: self.conn.clone(),
            topic: topic.to_string(),
            consumer: self.consumer.clone(),
            backlog_cursor: Some(BACKLOG_START.to_string()),
            buffer: VecDeque::new(),
            rewind: Arc::new(AtomicBool::new(false)),
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if state.rewind.swap(false, Ordering::SeqCst) {
                    // Buffered entries are still pending and will come back
                    // with the backlog.
                    state.buffer.clear();
                    state.backlog_cursor = Some(BACKLOG_START.to_string());
                }
                if let Some((id, payload)) = state.buffer.pop_front() {
                    let delivery = Delivery::new(id, payload, Box::new(state.acker()));
                    return Some((Ok(delivery), state));
                }
                if let Err(err) = state.fill().await {
                    return Some((Err(err), state));
                }
            }
        });

        Ok(stream.boxed())
    }
}

struct ReadState {
    reader: ConnectionManager,
    acker_conn: ConnectionManager,
    topic: String,
    consumer: StreamConsumerConfig,
    /// `Some` while replaying this consumer's pending entries.
    backlog_cursor: Option<String>,
    buffer: VecDeque<(String, Bytes)>,
    rewind: Arc<AtomicBool>,
}

impl ReadState {
    fn acker(&self) -> StreamAcker {
        StreamAcker {
            conn: self.acker_conn.clone(),
            topic: self.topic.clone(),
            group: self.consumer.group.clone(),
            rewind: self.rewind.clone(),
        }
    }

    async fn fill(&mut self) -> Result<(), BrokerError> {
        let mut options = StreamReadOptions::default()
            .group(&self.consumer.group, &self.consumer.consumer)
            .count(self.consumer.batch_size.max(1));
        let cursor = match self.backlog_cursor.as_deref() {
            Some(cursor) => cursor.to_string(),
            None => {
                options = options.block(self.consumer.block.as_millis() as usize);
                NEW_ENTRIES.to_string()
            }
        };

        let reply: Option<StreamReadReply> = self
            .reader
            .xread_options(&[self.topic.as_str()], &[cursor.as_str()], &options)
            .await
            .map_err(|e| BrokerError::unavailable("xreadgroup", e))?;

        let entries: Vec<(String, Bytes)> = reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(|entry| {
                        let payload = entry
                            .get::<Vec<u8>>(PAYLOAD_FIELD)
                            .map(Bytes::from)
                            .unwrap_or_default();
                        (entry.id, payload)
                    })
                    .collect()
            })
            .unwrap_or_default();

        if self.backlog_cursor.is_some() {
            self.backlog_cursor = entries.last().map(|(id, _)| id.clone());
            if self.backlog_cursor.is_none() {
                debug!(target = SOURCE, topic = %self.topic, "Pending backlog drained");
            }
        }
        self.buffer.extend(entries);
        Ok(())
    }
}

struct StreamAcker {
    conn: ConnectionManager,
    topic: String,
    group: String,
    rewind: Arc<AtomicBool>,
}

#[async_trait]
impl Acknowledger for StreamAcker {
    async fn ack(&self, delivery_id: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _acked: u64 = conn
            .xack(&self.topic, &self.group, &[delivery_id])
            .await
            .map_err(|e| BrokerError::unavailable("xack", e))?;
        Ok(())
    }

    async fn nack(&self, _delivery_id: &str) -> Result<(), BrokerError> {
        // The entry is still pending; replaying the backlog picks it up again.
        self.rewind.store(true, Ordering::SeqCst);
        Ok(())
    }
}
