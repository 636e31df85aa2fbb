//! HTTP surface of the post service.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::Response,
    routing::{delete, get, post},
};
use picshare_api_types::{
    AppendImageRequest, CreatePostRequest, CreatePostResponse, LikeResponse, MostLikedResponse,
    PostView, UserPostsResponse,
};

use crate::application::posts::PostService;
use crate::domain::types::{PostId, UserId};

use super::actor::Actor;
use super::error::ApiError;
use super::middleware::{log_responses, rate_limit, set_request_context};
use super::rate_limit::ApiRateLimiter;
use super::{HealthCheck, health_response};

#[derive(Clone)]
pub struct PostsState {
    pub posts: Arc<PostService>,
    pub health: Arc<dyn HealthCheck>,
    pub rate_limiter: ApiRateLimiter,
}

pub fn build_posts_router(state: PostsState) -> Router {
    let limiter = state.rate_limiter.clone();

    let api = Router::new()
        .route("/posts", post(create_post))
        .route("/posts/most-liked", get(most_liked))
        .route("/posts/{id}", get(get_post).delete(delete_post))
        .route("/posts/{id}/images", post(append_image))
        .route("/posts/{id}/images/{storage_key}", delete(delete_image))
        .route("/posts/{id}/like", post(like_post))
        .route("/users/{id}/posts", get(user_posts))
        .with_state(state.clone())
        .route_layer(axum_middleware::from_fn_with_state(limiter, rate_limit));

    Router::new()
        .route("/health", get(health))
        .with_state(state)
        .merge(api)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn create_post(
    State(state): State<PostsState>,
    Actor(actor): Actor,
    Json(body): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<CreatePostResponse>), ApiError> {
    let id = state.posts.create_post(actor, &body.name).await?;
    Ok((StatusCode::CREATED, Json(CreatePostResponse { id: id.get() })))
}

async fn get_post(
    State(state): State<PostsState>,
    Path(id): Path<i64>,
) -> Result<Json<PostView>, ApiError> {
    Ok(Json(state.posts.get_post(PostId::new(id)).await?))
}

async fn most_liked(State(state): State<PostsState>) -> Result<Json<MostLikedResponse>, ApiError> {
    let posts = state.posts.get_most_liked().await?;
    Ok(Json(MostLikedResponse { posts }))
}

async fn user_posts(
    State(state): State<PostsState>,
    Path(id): Path<i64>,
) -> Result<Json<UserPostsResponse>, ApiError> {
    Ok(Json(state.posts.get_user_posts(UserId::new(id)).await?))
}

async fn delete_post(
    State(state): State<PostsState>,
    Actor(actor): Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.posts.delete_post(actor, PostId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn append_image(
    State(state): State<PostsState>,
    Actor(actor): Actor,
    Path(id): Path<i64>,
    Json(body): Json<AppendImageRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .posts
        .append_image(actor, PostId::new(id), &body.storage_key)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_image(
    State(state): State<PostsState>,
    Actor(actor): Actor,
    Path((id, storage_key)): Path<(i64, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .posts
        .delete_image(actor, PostId::new(id), &storage_key)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_post(
    State(state): State<PostsState>,
    Actor(actor): Actor,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<LikeResponse>), ApiError> {
    let receipt = state.posts.like_post(actor, PostId::new(id)).await?;
    let created = receipt.outcome.is_created();
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(LikeResponse { post_id: id, created })))
}

async fn health(State(state): State<PostsState>) -> Response {
    health_response(state.health.check().await)
}
