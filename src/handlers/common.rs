use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{errors::ServiceError, models::Actor, ApiResponse};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Pagination parameters for catalog listings
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    pub fn clamped(&self, max_per_page: u64) -> (u64, u64) {
        (self.page.max(1), self.per_page.clamp(1, max_per_page))
    }
}

/// Body returned for every recorded movement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementRecorded {
    pub transaction_id: i32,
}

/// Who performed a movement, taken from the `x-actor-id` and `x-actor-name` headers
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = match parts.headers.get(ACTOR_ID_HEADER) {
            Some(raw) => Some(
                raw.to_str()
                    .ok()
                    .and_then(|value| value.trim().parse::<i32>().ok())
                    .ok_or_else(|| {
                        ServiceError::BadRequest(format!("{} must be an integer", ACTOR_ID_HEADER))
                    })?,
            ),
            None => None,
        };
        let name = parts
            .headers
            .get(ACTOR_NAME_HEADER)
            .and_then(|raw| raw.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self(Actor::new(user_id, name)))
    }
}
