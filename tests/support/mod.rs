//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::{Mutex, Notify};

use picshare::application::blobs::{BlobError, BlobLinker};
use picshare::application::posts::{PostService, PostServiceDeps};
use picshare::application::repos::{NotificationsRepo, PostsRepo, PostsWriteRepo, RepoError};
use picshare::cache::{Cache, CacheConfig, CacheError, PostCache};
use picshare::domain::notifications::{NewNotification, NotificationRecord};
use picshare::domain::posts::{LikeOutcome, PostName, PostRecord};
use picshare::domain::types::{PostId, UserId};
use picshare::events::{Broker, LikePublisher};

pub const TOPIC: &str = "like_exchange:new_like";

#[derive(Debug, Clone)]
struct StoredPost {
    owner: UserId,
    name: String,
    images: BTreeSet<String>,
    likes: HashSet<UserId>,
}

#[derive(Default)]
struct StoreState {
    next_id: i64,
    posts: HashMap<PostId, StoredPost>,
    uploaded: HashSet<String>,
}

/// Posts store with the same semantics as the Postgres adapter.
#[derive(Default)]
pub struct InMemoryPosts {
    state: Mutex<StoreState>,
}

impl InMemoryPosts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an uploaded image so it can be attached to posts.
    pub async fn upload(&self, storage_key: &str) {
        self.state
            .lock()
            .await
            .uploaded
            .insert(storage_key.to_string());
    }

    /// Writes a like directly, bypassing the service and its invalidation.
    pub async fn like_behind_the_cache(&self, id: PostId, liker: UserId) {
        if let Some(post) = self.state.lock().await.posts.get_mut(&id) {
            post.likes.insert(liker);
        }
    }

    fn record(id: PostId, post: &StoredPost) -> PostRecord {
        PostRecord {
            id,
            name: post.name.clone(),
            image_keys: post.images.iter().cloned().collect(),
            like_count: post.likes.len() as i64,
        }
    }
}

#[async_trait]
impl PostsRepo for InMemoryPosts {
    async fn find_post(&self, id: PostId) -> Result<Option<PostRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.posts.get(&id).map(|post| Self::record(id, post)))
    }

    async fn find_post_owner(&self, id: PostId) -> Result<Option<UserId>, RepoError> {
        Ok(self.state.lock().await.posts.get(&id).map(|post| post.owner))
    }

    async fn list_user_post_ids(&self, owner: UserId) -> Result<Vec<PostId>, RepoError> {
        let state = self.state.lock().await;
        let mut ids: Vec<PostId> = state
            .posts
            .iter()
            .filter(|(_, post)| post.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn most_liked_posts(&self, limit: u32) -> Result<Vec<PostRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut records: Vec<PostRecord> = state
            .posts
            .iter()
            .map(|(id, post)| Self::record(*id, post))
            .collect();
        records.sort_by(|a, b| b.like_count.cmp(&a.like_count).then(a.id.cmp(&b.id)));
        records.truncate(limit as usize);
        Ok(records)
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryPosts {
    async fn create_post(&self, owner: UserId, name: &PostName) -> Result<PostId, RepoError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = PostId::new(state.next_id);
        state.posts.insert(
            id,
            StoredPost {
                owner,
                name: name.as_str().to_string(),
                images: BTreeSet::new(),
                likes: HashSet::new(),
            },
        );
        Ok(id)
    }

    async fn append_image(&self, id: PostId, storage_key: &str) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        if !state.uploaded.contains(storage_key) {
            return Err(RepoError::invalid_input(format!(
                "no uploaded image with key `{storage_key}`"
            )));
        }
        let post = state.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        post.images.insert(storage_key.to_string());
        Ok(())
    }

    async fn remove_image(&self, id: PostId, storage_key: &str) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let post = state.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if post.images.remove(storage_key) {
            Ok(())
        } else {
            Err(RepoError::NotFound)
        }
    }

    async fn delete_post(&self, id: PostId) -> Result<(), RepoError> {
        self.state
            .lock()
            .await
            .posts
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn like_post(&self, id: PostId, liker: UserId) -> Result<LikeOutcome, RepoError> {
        let mut state = self.state.lock().await;
        let post = state.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        Ok(if post.likes.insert(liker) {
            LikeOutcome::Created
        } else {
            LikeOutcome::AlreadyLiked
        })
    }
}

#[derive(Default)]
pub struct InMemoryNotifications {
    records: Mutex<Vec<NotificationRecord>>,
}

impl InMemoryNotifications {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl NotificationsRepo for InMemoryNotifications {
    async fn record_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<NotificationRecord, RepoError> {
        let mut records = self.records.lock().await;
        let record = NotificationRecord {
            id: records.len() as i64 + 1,
            post_id: notification.post_id,
            liker_id: notification.liker_id,
            liked_id: notification.liked_id,
            created_at: OffsetDateTime::now_utc(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn list_notifications(
        &self,
        liked: UserId,
    ) -> Result<Vec<NotificationRecord>, RepoError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .rev()
            .filter(|record| record.liked_id == liked)
            .cloned()
            .collect())
    }
}

/// Deterministic linker: `https://cdn.test/<key>`, failing for keys listed as broken.
/// Can be held so a read parks mid-render until released.
#[derive(Default)]
pub struct StaticLinker {
    broken: std::sync::Mutex<HashSet<String>>,
    held: AtomicBool,
    parked: Notify,
    released: Notify,
}

impl StaticLinker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn break_key(&self, storage_key: &str) {
        self.broken
            .lock()
            .expect("linker lock")
            .insert(storage_key.to_string());
    }

    pub fn repair_key(&self, storage_key: &str) {
        self.broken.lock().expect("linker lock").remove(storage_key);
    }

    /// The next resolution parks until [`StaticLinker::release`].
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Waits until a resolution has parked.
    pub async fn parked(&self) {
        self.parked.notified().await;
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.released.notify_one();
    }
}

#[async_trait]
impl BlobLinker for StaticLinker {
    async fn resolve_url(&self, storage_key: &str) -> Result<String, BlobError> {
        if self.held.load(Ordering::SeqCst) {
            self.parked.notify_one();
            self.released.notified().await;
        }
        if self.broken.lock().expect("linker lock").contains(storage_key) {
            return Err(BlobError::Unavailable {
                key: storage_key.to_string(),
                message: "object store offline".to_string(),
            });
        }
        Ok(format!("https://cdn.test/{storage_key}"))
    }
}

/// Cache wrapper whose reads, writes, and deletes can be switched off.
pub struct SwitchableCache<C> {
    inner: C,
    reads_down: AtomicBool,
    writes_down: AtomicBool,
    deletes_down: AtomicBool,
}

impl<C: Cache> SwitchableCache<C> {
    pub fn new(inner: C) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reads_down: AtomicBool::new(false),
            writes_down: AtomicBool::new(false),
            deletes_down: AtomicBool::new(false),
        })
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reads_down.store(!reachable, Ordering::SeqCst);
        self.writes_down.store(!reachable, Ordering::SeqCst);
        self.deletes_down.store(!reachable, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.deletes_down.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<C: Cache> Cache for SwitchableCache<C> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        if self.reads_down.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("get", "connection refused"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        if self.writes_down.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("set", "connection refused"));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        if self.deletes_down.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("delete", "connection refused"));
        }
        self.inner.delete(key).await
    }
}

pub struct Harness {
    pub store: Arc<InMemoryPosts>,
    pub linker: Arc<StaticLinker>,
    pub service: PostService,
}

pub fn test_cache_config() -> CacheConfig {
    CacheConfig {
        invalidation_attempts: 2,
        invalidation_backoff_ms: 1,
        ..Default::default()
    }
}

/// Wires a `PostService` over in-memory collaborators.
pub fn post_service(cache: Arc<dyn Cache>, broker: Arc<dyn Broker>) -> Harness {
    post_service_with(cache, broker, test_cache_config())
}

pub fn post_service_with(
    cache: Arc<dyn Cache>,
    broker: Arc<dyn Broker>,
    config: CacheConfig,
) -> Harness {
    let store = InMemoryPosts::new();
    let linker = StaticLinker::new();
    let service = PostService::new(PostServiceDeps {
        reader: store.clone(),
        writer: store.clone(),
        blobs: linker.clone(),
        cache: PostCache::new(cache, config),
        publisher: LikePublisher::new(broker, TOPIC, Duration::from_secs(1)),
        deadline: Duration::from_secs(5),
    });
    Harness {
        store,
        linker,
        service,
    }
}
