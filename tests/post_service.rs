//! Cache-aside reads and invalidating writes through `PostService`.

mod support;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;

use picshare::application::posts::PostServiceError;
use picshare::cache::{Cache, CacheConfig, CacheKey, InvalidationOutcome, MemoryCache};
use picshare::domain::error::DomainError;
use picshare::domain::events::LikeEvent;
use picshare::domain::posts::LikeOutcome;
use picshare::domain::types::{PostId, UserId};
use picshare::events::{Broker, MemoryBroker, PublishOutcome};

use support::{SwitchableCache, TOPIC, post_service, post_service_with, test_cache_config};

const OWNER: UserId = UserId::new(9);
const LIKER: UserId = UserId::new(3);

fn memory_cache() -> Arc<MemoryCache> {
    Arc::new(MemoryCache::new(64))
}

#[tokio::test]
async fn invalidation_removes_cached_view_of_post_42() {
    let cache = memory_cache();
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));

    // Posts are numbered from 1; create up to 42.
    let mut post_id = PostId::new(0);
    for n in 0..42 {
        post_id = harness
            .service
            .create_post(OWNER, &format!("post {n}"))
            .await
            .expect("create post");
    }
    assert_eq!(post_id, PostId::new(42));

    cache
        .set(
            "42",
            Bytes::from_static(br#"{"name":"stale","images":{},"likes_count":0}"#),
            Duration::from_secs(5 * 60 * 60),
        )
        .await
        .expect("seed cache");

    harness
        .service
        .like_post(LIKER, post_id)
        .await
        .expect("like post");

    assert_eq!(cache.get("42").await.expect("get"), None);
}

#[tokio::test]
async fn empty_store_yields_empty_cached_ranking() {
    let cache = memory_cache();
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));

    let ranking = harness.service.get_most_liked().await.expect("ranking");

    assert!(ranking.is_empty());
    let cached = cache
        .get(&CacheKey::MostLiked.render())
        .await
        .expect("get")
        .expect("ranking cached");
    assert_eq!(cached.as_ref(), b"[]");
}

#[tokio::test]
async fn like_is_visible_to_the_next_read() {
    let cache = memory_cache();
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));
    let post_id = harness
        .service
        .create_post(OWNER, "holiday")
        .await
        .expect("create");

    let before = harness.service.get_post(post_id).await.expect("first read");
    assert_eq!(before.like_count, 0);
    assert!(cache.get(&post_id.to_string()).await.expect("get").is_some());

    harness
        .service
        .like_post(LIKER, post_id)
        .await
        .expect("like");

    let after = harness.service.get_post(post_id).await.expect("second read");
    assert_eq!(after.like_count, 1);
}

#[tokio::test]
async fn reads_fall_back_to_store_when_cache_is_down() {
    let cache = SwitchableCache::new(MemoryCache::new(64));
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));
    harness.store.upload("beach.png").await;
    let post_id = harness
        .service
        .create_post(OWNER, "beach")
        .await
        .expect("create");
    harness
        .service
        .append_image(OWNER, post_id, "beach.png")
        .await
        .expect("append");

    cache.set_reachable(false);
    let view = harness.service.get_post(post_id).await.expect("read");

    assert_eq!(view.name, "beach");
    assert_eq!(view.image_url("beach.png"), Some("https://cdn.test/beach.png"));
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_repopulated_from_store() {
    let cache = memory_cache();
    let config = CacheConfig {
        post_ttl_seconds: 1,
        ..test_cache_config()
    };
    let harness = post_service_with(cache.clone(), Arc::new(MemoryBroker::new()), config);
    let post_id = harness
        .service
        .create_post(OWNER, "sunset")
        .await
        .expect("create");
    let key = post_id.to_string();

    harness.service.get_post(post_id).await.expect("warm");
    harness.store.like_behind_the_cache(post_id, LIKER).await;
    assert_eq!(
        harness.service.get_post(post_id).await.expect("cached").like_count,
        0
    );

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get(&key).await.expect("get"), None);

    let fresh = harness.service.get_post(post_id).await.expect("reload");
    assert_eq!(fresh.like_count, 1);
    assert!(cache.get(&key).await.expect("get").is_some());
}

#[tokio::test]
async fn partial_image_resolution_is_served_but_not_cached() {
    let cache = memory_cache();
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));
    harness.store.upload("a.png").await;
    harness.store.upload("b.png").await;
    let post_id = harness
        .service
        .create_post(OWNER, "album")
        .await
        .expect("create");
    for key in ["a.png", "b.png"] {
        harness
            .service
            .append_image(OWNER, post_id, key)
            .await
            .expect("append");
    }

    harness.linker.break_key("b.png");
    let partial = harness.service.get_post(post_id).await.expect("read");
    assert_eq!(partial.images.len(), 1);
    assert!(cache.get(&post_id.to_string()).await.expect("get").is_none());

    harness.linker.repair_key("b.png");
    let full = harness.service.get_post(post_id).await.expect("read");
    assert_eq!(full.images.len(), 2);
    assert!(cache.get(&post_id.to_string()).await.expect("get").is_some());
}

#[tokio::test]
async fn non_owner_is_rejected_before_anything_changes() {
    let cache = memory_cache();
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));
    harness.store.upload("x.png").await;
    let post_id = harness
        .service
        .create_post(OWNER, "mine")
        .await
        .expect("create");
    harness.service.get_post(post_id).await.expect("warm cache");

    let err = harness
        .service
        .append_image(LIKER, post_id, "x.png")
        .await
        .expect_err("forbidden");
    assert!(matches!(
        err,
        PostServiceError::Domain(DomainError::Forbidden { .. })
    ));

    let err = harness
        .service
        .delete_post(LIKER, post_id)
        .await
        .expect_err("forbidden");
    assert!(matches!(
        err,
        PostServiceError::Domain(DomainError::Forbidden { .. })
    ));

    // Neither the store nor the cache was touched.
    assert!(cache.get(&post_id.to_string()).await.expect("get").is_some());
    assert!(harness.service.get_post(post_id).await.expect("read").images.is_empty());
}

#[tokio::test]
async fn failed_invalidation_fails_the_write_but_keeps_it() {
    let cache = SwitchableCache::new(MemoryCache::new(64));
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));
    harness.store.upload("p.png").await;
    let post_id = harness
        .service
        .create_post(OWNER, "flaky")
        .await
        .expect("create");

    cache.fail_deletes(true);
    let err = harness
        .service
        .append_image(OWNER, post_id, "p.png")
        .await
        .expect_err("invalidation failure surfaces");
    assert!(matches!(
        err,
        PostServiceError::InvalidationFailed { post_id: id, .. } if id == post_id
    ));

    // The retry is a no-op write followed by a working invalidation.
    cache.fail_deletes(false);
    let outcome = harness
        .service
        .append_image(OWNER, post_id, "p.png")
        .await
        .expect("retry succeeds");
    assert_eq!(outcome, InvalidationOutcome::NothingCached);

    let view = harness.service.get_post(post_id).await.expect("read");
    assert_eq!(view.images.len(), 1);
}

#[tokio::test]
async fn retried_post_delete_clears_the_cache() {
    let cache = SwitchableCache::new(MemoryCache::new(64));
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));
    let post_id = harness
        .service
        .create_post(OWNER, "doomed")
        .await
        .expect("create");
    harness.service.get_post(post_id).await.expect("warm");

    cache.fail_deletes(true);
    let err = harness
        .service
        .delete_post(OWNER, post_id)
        .await
        .expect_err("invalidation failure surfaces");
    assert!(matches!(err, PostServiceError::InvalidationFailed { .. }));

    // The post is already gone, so the retry reports it missing but still
    // removes the entry the first attempt left behind.
    cache.fail_deletes(false);
    let err = harness
        .service
        .delete_post(OWNER, post_id)
        .await
        .expect_err("already deleted");
    assert!(matches!(
        err,
        PostServiceError::Domain(DomainError::NotFound { entity: "post" })
    ));

    let key = CacheKey::Post(post_id).render();
    assert_eq!(cache.inner().get(&key).await.expect("get"), None);
    let err = harness.service.get_post(post_id).await.expect_err("gone");
    assert!(matches!(
        err,
        PostServiceError::Domain(DomainError::NotFound { entity: "post" })
    ));
}

#[tokio::test]
async fn retried_image_delete_clears_the_cache() {
    let cache = SwitchableCache::new(MemoryCache::new(64));
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));
    harness.store.upload("a.png").await;
    let post_id = harness
        .service
        .create_post(OWNER, "album")
        .await
        .expect("create");
    harness
        .service
        .append_image(OWNER, post_id, "a.png")
        .await
        .expect("attach");
    let warm = harness.service.get_post(post_id).await.expect("warm");
    assert_eq!(warm.images.len(), 1);

    cache.fail_deletes(true);
    let err = harness
        .service
        .delete_image(OWNER, post_id, "a.png")
        .await
        .expect_err("invalidation failure surfaces");
    assert!(matches!(err, PostServiceError::InvalidationFailed { .. }));

    cache.fail_deletes(false);
    let err = harness
        .service
        .delete_image(OWNER, post_id, "a.png")
        .await
        .expect_err("already detached");
    assert!(matches!(
        err,
        PostServiceError::Domain(DomainError::NotFound { entity: "image" })
    ));

    let view = harness.service.get_post(post_id).await.expect("read");
    assert!(view.images.is_empty());
}

#[tokio::test]
async fn missing_post_delete_still_needs_a_working_cache() {
    let cache = SwitchableCache::new(MemoryCache::new(64));
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));

    cache.fail_deletes(true);
    let err = harness
        .service
        .delete_post(OWNER, PostId::new(404))
        .await
        .expect_err("cache down");
    assert!(matches!(err, PostServiceError::InvalidationFailed { .. }));
}

#[tokio::test]
async fn fill_racing_a_like_is_not_cached() {
    let harness = post_service(memory_cache(), Arc::new(MemoryBroker::new()));
    harness.store.upload("a.png").await;
    let post_id = harness
        .service
        .create_post(OWNER, "racy")
        .await
        .expect("create");
    harness
        .service
        .append_image(OWNER, post_id, "a.png")
        .await
        .expect("attach");

    // The read loads the record, then parks while resolving image URLs. The
    // like commits and invalidates before the read is let go.
    harness.linker.hold();
    let read = harness.service.get_post(post_id);
    let like = async {
        harness.linker.parked().await;
        let receipt = harness
            .service
            .like_post(LIKER, post_id)
            .await
            .expect("like");
        harness.linker.release();
        receipt
    };
    let (raced, receipt) = tokio::join!(read, like);

    assert_eq!(receipt.outcome, LikeOutcome::Created);
    assert_eq!(raced.expect("racing read").like_count, 0);
    let view = harness.service.get_post(post_id).await.expect("read");
    assert_eq!(view.like_count, 1);
}

#[tokio::test]
async fn deleting_a_post_drops_its_cached_view() {
    let cache = memory_cache();
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));
    let post_id = harness
        .service
        .create_post(OWNER, "temporary")
        .await
        .expect("create");
    harness.service.get_post(post_id).await.expect("warm");

    let outcome = harness
        .service
        .delete_post(OWNER, post_id)
        .await
        .expect("delete");
    assert_eq!(outcome, InvalidationOutcome::Removed);

    let err = harness.service.get_post(post_id).await.expect_err("gone");
    assert!(matches!(
        err,
        PostServiceError::Domain(DomainError::NotFound { entity: "post" })
    ));
}

#[tokio::test]
async fn unknown_image_and_post_are_reported() {
    let harness = post_service(memory_cache(), Arc::new(MemoryBroker::new()));
    let post_id = harness
        .service
        .create_post(OWNER, "empty")
        .await
        .expect("create");

    let err = harness
        .service
        .append_image(OWNER, post_id, "never-uploaded.png")
        .await
        .expect_err("unknown image");
    assert!(matches!(
        err,
        PostServiceError::Domain(DomainError::Validation { .. })
    ));

    let err = harness
        .service
        .delete_image(OWNER, post_id, "never-attached.png")
        .await
        .expect_err("not attached");
    assert!(matches!(
        err,
        PostServiceError::Domain(DomainError::NotFound { entity: "image" })
    ));

    let err = harness
        .service
        .like_post(LIKER, PostId::new(999))
        .await
        .expect_err("no such post");
    assert!(matches!(
        err,
        PostServiceError::Domain(DomainError::NotFound { entity: "post" })
    ));
}

#[tokio::test]
async fn invalid_names_are_rejected() {
    let harness = post_service(memory_cache(), Arc::new(MemoryBroker::new()));
    let long = "x".repeat(31);
    for name in ["", "   ", long.as_str()] {
        let err = harness
            .service
            .create_post(OWNER, name)
            .await
            .expect_err("invalid name");
        assert!(matches!(
            err,
            PostServiceError::Domain(DomainError::Validation { .. })
        ));
    }
}

#[tokio::test]
async fn only_the_first_like_publishes_an_event() {
    let broker = Arc::new(MemoryBroker::new());
    let harness = post_service(memory_cache(), broker.clone());
    let post_id = harness
        .service
        .create_post(OWNER, "popular")
        .await
        .expect("create");
    let mut subscription = broker.subscribe(TOPIC).await.expect("subscribe");

    let first = harness
        .service
        .like_post(LIKER, post_id)
        .await
        .expect("first like");
    assert_eq!(first.outcome, LikeOutcome::Created);
    let publish = first.publish.expect("event published");
    assert_eq!(publish.outcome().await, PublishOutcome::Accepted);

    let second = harness
        .service
        .like_post(LIKER, post_id)
        .await
        .expect("second like");
    assert_eq!(second.outcome, LikeOutcome::AlreadyLiked);
    assert!(second.publish.is_none());

    let delivery = subscription
        .next()
        .await
        .expect("stream open")
        .expect("delivery");
    let event = LikeEvent::decode(delivery.payload()).expect("decode");
    assert_eq!(event, LikeEvent::new(post_id, LIKER, OWNER));
    delivery.ack().await.expect("ack");
    assert_eq!(broker.in_flight(TOPIC), 0);
}

#[tokio::test]
async fn like_still_publishes_when_invalidation_fails() {
    let broker = Arc::new(MemoryBroker::new());
    let cache = SwitchableCache::new(MemoryCache::new(64));
    let harness = post_service(cache.clone(), broker.clone());
    let post_id = harness
        .service
        .create_post(OWNER, "contested")
        .await
        .expect("create");
    let mut subscription = broker.subscribe(TOPIC).await.expect("subscribe");

    cache.fail_deletes(true);
    let err = harness
        .service
        .like_post(LIKER, post_id)
        .await
        .expect_err("invalidation failure surfaces");
    assert!(matches!(err, PostServiceError::InvalidationFailed { .. }));

    let delivery = tokio::time::timeout(Duration::from_secs(1), subscription.next())
        .await
        .expect("event arrives")
        .expect("stream open")
        .expect("delivery");
    assert_eq!(
        LikeEvent::decode(delivery.payload()).expect("decode").post_id,
        post_id
    );
}

#[tokio::test]
async fn user_posts_are_listed_in_id_order() {
    let harness = post_service(memory_cache(), Arc::new(MemoryBroker::new()));
    let first = harness.service.create_post(OWNER, "one").await.expect("create");
    harness
        .service
        .create_post(LIKER, "other user")
        .await
        .expect("create");
    let second = harness.service.create_post(OWNER, "two").await.expect("create");

    let listing = harness.service.get_user_posts(OWNER).await.expect("list");

    assert_eq!(listing.user_id, OWNER.get());
    let ids: Vec<i64> = listing.posts.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![first.get(), second.get()]);
    assert_eq!(listing.posts[1].post.name, "two");
}

#[tokio::test]
async fn ranking_is_served_from_cache_until_it_expires() {
    let cache = memory_cache();
    let harness = post_service(cache.clone(), Arc::new(MemoryBroker::new()));
    let quiet = harness.service.create_post(OWNER, "quiet").await.expect("create");
    let loud = harness.service.create_post(OWNER, "loud").await.expect("create");
    for liker in 1..=3 {
        harness
            .service
            .like_post(UserId::new(100 + liker), loud)
            .await
            .expect("like");
    }
    harness
        .service
        .like_post(LIKER, quiet)
        .await
        .expect("like");

    let ranking = harness.service.get_most_liked().await.expect("ranking");
    let names: Vec<&str> = ranking.iter().map(|view| view.name.as_str()).collect();
    assert_eq!(names, vec!["loud", "quiet"]);

    // Likes never invalidate the ranking.
    for liker in 10..=14 {
        harness
            .service
            .like_post(UserId::new(liker), quiet)
            .await
            .expect("like");
    }
    let stale = harness.service.get_most_liked().await.expect("ranking");
    assert_eq!(stale[0].name, "loud");

    assert!(
        cache
            .delete(&CacheKey::MostLiked.render())
            .await
            .expect("expire")
    );
    let fresh = harness.service.get_most_liked().await.expect("ranking");
    assert_eq!(fresh[0].name, "quiet");
}
