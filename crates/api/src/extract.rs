//! Request extractors shared by the handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Actor, ActorRole, OrderId};

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Who is making the request, taken from the `x-actor-id` and
/// `x-actor-role` headers set by the gateway in front of this service.
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ApiError::BadRequest(format!("Missing {name} header")))
        };

        let id = header(ACTOR_ID_HEADER)?;
        let role: ActorRole = header(ACTOR_ROLE_HEADER)?
            .parse()
            .map_err(|e: common::ParseStatusError| ApiError::BadRequest(e.to_string()))?;

        Ok(RequestActor(Actor::new(id, role)))
    }
}

pub fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
