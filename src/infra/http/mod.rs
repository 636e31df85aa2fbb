//! axum routers for the post service and the notifier.

mod actor;
mod error;
mod middleware;
mod notifications;
mod posts;
mod rate_limit;

pub use actor::{ACTOR_HEADER, Actor};
pub use error::{ApiError, codes};
pub use notifications::{NotifierState, build_notifier_router};
pub use posts::{PostsState, build_posts_router};
pub use rate_limit::{ApiRateLimiter, RateDecision};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;

/// Liveness of a backing store.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> Result<(), RepoError>;
}

fn health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
