//! Payment endpoints, keyed by order and provider name.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::PaymentIntent;
use common::Order;
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{RequestActor, parse_order_id};

#[derive(Deserialize)]
pub struct PaymentReference {
    pub reference: String,
}

/// POST /orders/{id}/payments/{provider}
#[tracing::instrument(skip(state))]
pub async fn initiate<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, provider)): Path<(String, String)>,
) -> Result<(StatusCode, Json<PaymentIntent>), ApiError> {
    let intent = state
        .payments
        .initiate_payment(parse_order_id(&id)?, &provider)
        .await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// POST /orders/{id}/payments/{provider}/confirm verifies with the provider
/// and marks the order PAID.
#[tracing::instrument(skip(state, actor, req))]
pub async fn confirm<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, provider)): Path<(String, String)>,
    RequestActor(actor): RequestActor,
    Json(req): Json<PaymentReference>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .payments
        .confirm_payment(parse_order_id(&id)?, &provider, &req.reference, &actor)
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/payments/{provider}/refund
#[tracing::instrument(skip(state, actor, req))]
pub async fn refund<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, provider)): Path<(String, String)>,
    RequestActor(actor): RequestActor,
    Json(req): Json<PaymentReference>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .payments
        .refund_payment(parse_order_id(&id)?, &provider, &req.reference, &actor)
        .await?;
    Ok(Json(order))
}
