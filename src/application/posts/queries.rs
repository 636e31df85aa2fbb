use std::collections::BTreeMap;

use futures::future::join_all;
use picshare_api_types::{PostView, UserPostEntry, UserPostsResponse};
use tracing::{debug, instrument, warn};

use crate::cache::CacheLookup;
use crate::domain::error::DomainError;
use crate::domain::posts::PostRecord;
use crate::domain::types::{PostId, UserId};

use super::service::PostService;
use super::types::PostServiceError;

const SOURCE: &str = "application::posts";

impl PostService {
    /// Cache-aside read of one post.
    #[instrument(skip(self))]
    pub async fn get_post(&self, post_id: PostId) -> Result<PostView, PostServiceError> {
        self.within(self.load_post(post_id)).await
    }

    /// All posts owned by `user`, each served through the post cache. Posts
    /// deleted while the listing runs are left out.
    #[instrument(skip(self))]
    pub async fn get_user_posts(&self, user: UserId) -> Result<UserPostsResponse, PostServiceError> {
        self.within(async {
            let ids = self.reader.list_user_post_ids(user).await?;
            let mut posts = Vec::with_capacity(ids.len());
            for id in ids {
                match self.load_post(id).await {
                    Ok(post) => posts.push(UserPostEntry { id: id.get(), post }),
                    Err(PostServiceError::Domain(DomainError::NotFound { .. })) => {
                        debug!(target = SOURCE, post_id = %id, "post vanished during listing");
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(UserPostsResponse {
                user_id: user.get(),
                posts,
            })
        })
        .await
    }

    /// The leaderboard. Cached as a whole under one key with a short TTL and
    /// never invalidated by likes, so it may lag by up to that TTL.
    #[instrument(skip(self))]
    pub async fn get_most_liked(&self) -> Result<Vec<PostView>, PostServiceError> {
        self.within(async {
            if let CacheLookup::Hit(ranking) = self.cache.lookup_most_liked().await {
                return Ok(ranking);
            }

            let limit = self.cache.config().most_liked_limit;
            let records = self.reader.most_liked_posts(limit).await?;
            let rendered = join_all(records.iter().map(|record| self.render(record))).await;
            let complete = rendered.iter().all(|(_, complete)| *complete);
            let ranking: Vec<PostView> = rendered.into_iter().map(|(view, _)| view).collect();

            if complete {
                if let Err(err) = self.cache.store_most_liked(&ranking).await {
                    warn!(target = SOURCE, error = %err, "failed to cache most-liked ranking");
                }
            }
            Ok(ranking)
        })
        .await
    }

    pub(super) async fn load_post(&self, post_id: PostId) -> Result<PostView, PostServiceError> {
        if let CacheLookup::Hit(view) = self.cache.lookup_post(post_id).await {
            return Ok(view);
        }

        let ticket = self.cache.fill_ticket(post_id);
        let record = self
            .reader
            .find_post(post_id)
            .await?
            .ok_or_else(|| DomainError::not_found("post"))?;
        let (view, complete) = self.render(&record).await;

        if complete {
            if let Err(err) = self.cache.fill_post(ticket, &view).await {
                warn!(
                    target = SOURCE,
                    post_id = %post_id,
                    error = %err,
                    "failed to cache post view"
                );
            }
        }
        Ok(view)
    }

    /// Builds the view and reports whether every image URL resolved. Partial
    /// views are served but never cached.
    async fn render(&self, record: &PostRecord) -> (PostView, bool) {
        let resolved = join_all(record.image_keys.iter().map(|key| async move {
            (key, self.blobs.resolve_url(key).await)
        }))
        .await;

        let mut images = BTreeMap::new();
        let mut complete = true;
        for (key, url) in resolved {
            match url {
                Ok(url) => {
                    images.insert(key.clone(), url);
                }
                Err(err) => {
                    complete = false;
                    warn!(
                        target = SOURCE,
                        post_id = %record.id,
                        storage_key = %key,
                        error = %err,
                        "could not resolve image URL; omitting it"
                    );
                }
            }
        }

        let view = PostView {
            name: record.name.clone(),
            images,
            like_count: record.like_count,
        };
        (view, complete)
    }
}
