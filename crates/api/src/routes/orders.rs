//! Order lookup and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{Order, OrderStatus, OrderStatusHistory};
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{RequestActor, parse_order_id};

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.get_order(parse_order_id(&id)?).await?;
    Ok(Json(order))
}

/// GET /orders/{id}/history returns status changes, oldest first.
#[tracing::instrument(skip(state))]
pub async fn history<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderStatusHistory>>, ApiError> {
    let history = state.orders.history(parse_order_id(&id)?).await?;
    Ok(Json(history))
}

/// POST /orders/{id}/transition
#[tracing::instrument(skip(state, actor, req), fields(to = %req.status))]
pub async fn transition<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    RequestActor(actor): RequestActor,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: common::ParseStatusError| ApiError::BadRequest(e.to_string()))?;

    let order = state
        .orders
        .transition(order_id, status, &actor, req.note)
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, actor, req))]
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    RequestActor(actor): RequestActor,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .orders
        .cancel_order(order_id, &actor, req.reason)
        .await?;
    Ok(Json(order))
}
