//! Best-effort publication of like events.
//!
//! `publish` returns immediately. The send runs on its own task under a
//! timeout; its result is logged, metered, and available through the returned
//! [`PublishHandle`] for callers that want to observe it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::events::LikeEvent;

use super::broker::Broker;

const SOURCE: &str = "events::publisher";
const METRIC_PUBLISH: &str = "picshare_like_publish_total";
const METRIC_PUBLISH_MS: &str = "picshare_like_publish_ms";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    Failed(String),
    TimedOut,
}

impl PublishOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            PublishOutcome::Accepted => "accepted",
            PublishOutcome::Failed(_) => "failed",
            PublishOutcome::TimedOut => "timeout",
        }
    }
}

/// Completion signal of one publish task.
#[derive(Debug)]
pub struct PublishHandle(JoinHandle<PublishOutcome>);

impl PublishHandle {
    pub async fn outcome(self) -> PublishOutcome {
        self.0
            .await
            .unwrap_or_else(|err| PublishOutcome::Failed(format!("publish task aborted: {err}")))
    }
}

#[derive(Clone)]
pub struct LikePublisher {
    broker: Arc<dyn Broker>,
    topic: String,
    timeout: Duration,
}

impl LikePublisher {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            broker,
            topic: topic.into(),
            timeout,
        }
    }

    pub fn publish(&self, event: LikeEvent) -> PublishHandle {
        let broker = self.broker.clone();
        let topic = self.topic.clone();
        let timeout = self.timeout;

        PublishHandle(tokio::spawn(async move {
            let started = Instant::now();
            let outcome = send(broker.as_ref(), &topic, &event, timeout).await;
            histogram!(METRIC_PUBLISH_MS).record(started.elapsed().as_secs_f64() * 1000.0);
            counter!(METRIC_PUBLISH, "outcome" => outcome.as_label()).increment(1);

            match &outcome {
                PublishOutcome::Accepted => debug!(
                    target = SOURCE,
                    topic = %topic,
                    post_id = %event.post_id,
                    liker_id = %event.liker_id,
                    "Like event published"
                ),
                PublishOutcome::Failed(reason) => warn!(
                    target = SOURCE,
                    topic = %topic,
                    post_id = %event.post_id,
                    liker_id = %event.liker_id,
                    reason = %reason,
                    "Like event not published; notification will be missing"
                ),
                PublishOutcome::TimedOut => warn!(
                    target = SOURCE,
                    topic = %topic,
                    post_id = %event.post_id,
                    liker_id = %event.liker_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Like event publish timed out; notification will be missing"
                ),
            }
            outcome
        }))
    }
}

async fn send(
    broker: &dyn Broker,
    topic: &str,
    event: &LikeEvent,
    timeout: Duration,
) -> PublishOutcome {
    let payload = match event.encode() {
        Ok(payload) => payload,
        Err(err) => return PublishOutcome::Failed(err.to_string()),
    };
    match tokio::time::timeout(timeout, broker.publish(topic, payload)).await {
        Ok(Ok(())) => PublishOutcome::Accepted,
        Ok(Err(err)) => PublishOutcome::Failed(err.to_string()),
        Err(_) => PublishOutcome::TimedOut,
    }
}
