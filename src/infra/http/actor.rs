//! The acting user, as asserted by the upstream gateway.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::types::UserId;

use super::error::ApiError;

pub const ACTOR_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub UserId);

fn parse(raw: &str) -> Result<Actor, String> {
    let id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("`{ACTOR_HEADER}` must be a positive integer"))?;
    if id <= 0 {
        return Err(format!("`{ACTOR_HEADER}` must be a positive integer"));
    }
    Ok(Actor(UserId::new(id)))
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| ApiError::unauthorized(format!("missing `{ACTOR_HEADER}` header")))?
            .to_str()
            .map_err(|_| ApiError::unauthorized(format!("`{ACTOR_HEADER}` is not valid text")))?;
        parse(raw).map_err(ApiError::unauthorized)
    }
}
