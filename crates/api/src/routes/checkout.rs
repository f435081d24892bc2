//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use checkout::CheckoutRequest;
use common::Order;
use serde::Serialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub orders: Vec<Order>,
}

/// POST /checkout reserves stock and creates one order per store.
#[tracing::instrument(skip(state, request), fields(user_id = %request.user_id))]
pub async fn checkout<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let orders = state.checkout.checkout(request).await?;
    Ok((StatusCode::CREATED, Json(CheckoutResponse { orders })))
}
