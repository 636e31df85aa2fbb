use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

mod support;

use bytes::Bytes;
use futures::StreamExt;
use metrics_util::debugging::DebuggingRecorder;

use picshare::application::notifications::NotificationService;
use picshare::cache::{Cache, MemoryCache};
use picshare::domain::types::{PostId, UserId};
use picshare::events::{
    Broker, ConsumerConfig, DedupPolicy, MemoryBroker, NotificationConsumer, PublishOutcome,
    WindowedDeduplicator,
};

use support::{InMemoryNotifications, SwitchableCache, TOPIC, post_service};

#[tokio::test]
async fn cache_and_event_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = SwitchableCache::new(MemoryCache::new(16));
    let broker = Arc::new(MemoryBroker::new());
    let harness = post_service(cache.clone(), broker.clone());
    let owner = UserId::new(1);
    let post_id = harness
        .service
        .create_post(owner, "metrics")
        .await
        .expect("create");

    // Miss, then hit.
    harness.service.get_post(post_id).await.expect("miss");
    harness.service.get_post(post_id).await.expect("hit");

    // Removed, retried and failed invalidations plus one accepted publish.
    let receipt = harness
        .service
        .like_post(UserId::new(2), post_id)
        .await
        .expect("like");
    assert_eq!(
        receipt.publish.expect("published").outcome().await,
        PublishOutcome::Accepted
    );
    cache.fail_deletes(true);
    assert!(harness.service.delete_post(owner, post_id).await.is_err());

    cache.set_reachable(false);
    assert!(harness.service.get_most_liked().await.is_ok());

    cache.set_reachable(true);
    cache
        .inner()
        .set("999", Bytes::from_static(b"{broken"), Duration::from_secs(60))
        .await
        .expect("raw set");
    assert!(harness.service.get_post(PostId::new(999)).await.is_err());

    // The like published above, then a malformed message.
    let consumer = NotificationConsumer::new(
        broker.clone(),
        NotificationService::new(InMemoryNotifications::new()),
        Arc::new(WindowedDeduplicator::new(DedupPolicy::ByDelivery, 16)),
        ConsumerConfig {
            topic: TOPIC.to_string(),
            reconnect_backoff: Duration::from_millis(10),
            retry_backoff: Duration::from_millis(10),
        },
    );
    broker
        .publish(TOPIC, Bytes::from_static(b"not json"))
        .await
        .expect("publish");
    let mut subscription = broker.subscribe(TOPIC).await.expect("subscribe");
    for _ in 0..2 {
        let delivery = subscription
            .next()
            .await
            .expect("stream open")
            .expect("delivery");
        consumer.process_delivery(delivery).await;
    }

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "picshare_cache_hit_total",
        "picshare_cache_miss_total",
        "picshare_cache_unavailable_total",
        "picshare_cache_corrupt_total",
        "picshare_invalidation_total",
        "picshare_invalidation_retry_total",
        "picshare_like_publish_total",
        "picshare_like_publish_ms",
        "picshare_consumer_processed_total",
        "picshare_consumer_malformed_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
