//! Notification consumer: turns like deliveries into stored notifications.
//!
//! Each delivery settles exactly one way. Malformed payloads and duplicates
//! are acked and dropped; a failed insert is nacked so the broker hands the
//! message back. A broken subscription is reopened after a backoff, and the
//! loop exits only when the shutdown token fires.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::notifications::NotificationService;
use crate::domain::events::LikeEvent;

use super::broker::{Broker, BrokerError, Delivery};
use super::dedup::{DedupKey, DeliveryDeduplicator};

const SOURCE: &str = "events::consumer";
const METRIC_PROCESSED: &str = "picshare_consumer_processed_total";
const METRIC_MALFORMED: &str = "picshare_consumer_malformed_total";
const METRIC_DUPLICATE: &str = "picshare_consumer_duplicate_total";
const METRIC_PERSIST_FAILED: &str = "picshare_consumer_persist_failed_total";

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub topic: String,
    /// Wait before reopening a failed or closed subscription.
    pub reconnect_backoff: Duration,
    /// Pause after a nack so a failing store is not hammered.
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Recorded,
    Duplicate,
    Malformed,
    PersistFailed,
}

pub struct NotificationConsumer {
    broker: Arc<dyn Broker>,
    service: NotificationService,
    dedup: Arc<dyn DeliveryDeduplicator>,
    config: ConsumerConfig,
}

impl NotificationConsumer {
    pub fn new(
        broker: Arc<dyn Broker>,
        service: NotificationService,
        dedup: Arc<dyn DeliveryDeduplicator>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            broker,
            service,
            dedup,
            config,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(target = SOURCE, topic = %self.config.topic, "notification consumer started");

        'subscription: while !shutdown.is_cancelled() {
            let subscribed = tokio::select! {
                _ = shutdown.cancelled() => break,
                subscribed = self.broker.subscribe(&self.config.topic) => subscribed,
            };

            match subscribed {
                Ok(mut deliveries) => loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break 'subscription,
                        next = deliveries.next() => match next {
                            Some(Ok(delivery)) => {
                                if self.process_delivery(delivery).await == HandleOutcome::PersistFailed
                                    && !pause(&shutdown, self.config.retry_backoff).await
                                {
                                    break 'subscription;
                                }
                            }
                            Some(Err(err)) => {
                                warn!(target = SOURCE, error = %err, "subscription failed; reopening");
                                break;
                            }
                            None => {
                                warn!(target = SOURCE, "subscription closed; reopening");
                                break;
                            }
                        },
                    }
                },
                Err(err) => log_subscribe_error(&self.config.topic, &err),
            }

            if !pause(&shutdown, self.config.reconnect_backoff).await {
                break;
            }
        }

        info!(target = SOURCE, "notification consumer stopped");
    }

    /// Handle one delivery and settle it with the broker.
    pub async fn process_delivery(&self, delivery: Delivery) -> HandleOutcome {
        let event = match LikeEvent::decode(delivery.payload()) {
            Ok(event) => event,
            Err(err) => {
                counter!(METRIC_MALFORMED).increment(1);
                warn!(
                    target = SOURCE,
                    delivery_id = delivery.id(),
                    error = %err,
                    "dropping malformed like event"
                );
                settle(delivery, true).await;
                return HandleOutcome::Malformed;
            }
        };

        let key = DedupKey {
            post_id: event.post_id,
            liker_id: event.liker_id,
            delivery_id: delivery.id().to_string(),
        };
        if !self.dedup.first_sighting(&key) {
            counter!(METRIC_DUPLICATE).increment(1);
            debug!(target = SOURCE, delivery_id = delivery.id(), "duplicate like event");
            settle(delivery, true).await;
            return HandleOutcome::Duplicate;
        }

        match self.service.record(&event).await {
            Ok(_) => {
                counter!(METRIC_PROCESSED).increment(1);
                settle(delivery, true).await;
                HandleOutcome::Recorded
            }
            Err(err) => {
                self.dedup.forget(&key);
                counter!(METRIC_PERSIST_FAILED).increment(1);
                error!(
                    target = SOURCE,
                    delivery_id = delivery.id(),
                    post_id = %event.post_id,
                    error = %err,
                    "failed to store notification; requesting redelivery"
                );
                settle(delivery, false).await;
                HandleOutcome::PersistFailed
            }
        }
    }
}

async fn settle(delivery: Delivery, ack: bool) {
    let id = delivery.id().to_string();
    let result = if ack {
        delivery.ack().await
    } else {
        delivery.nack().await
    };
    if let Err(err) = result {
        warn!(target = SOURCE, delivery_id = %id, ack, error = %err, "failed to settle delivery");
    }
}

fn log_subscribe_error(topic: &str, err: &BrokerError) {
    warn!(target = SOURCE, topic, error = %err, "subscribe failed; retrying");
}

/// Sleeps for `period`; false when shutdown fired first.
async fn pause(shutdown: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}
