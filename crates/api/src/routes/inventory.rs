//! Stock lookup and seller adjustments.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{InventoryRecord, ProductId};
use domain::{Availability, AvailabilityRequest};
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::RequestActor;

#[derive(Deserialize)]
pub struct AdjustRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub items: Vec<AvailabilityRequest>,
}

/// GET /inventory/{product_id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
) -> Result<Json<InventoryRecord>, ApiError> {
    let record = state.ledger.get_record(&ProductId::new(product_id)).await?;
    Ok(Json(record))
}

/// POST /inventory/{product_id}/restock
#[tracing::instrument(skip(state, actor, req), fields(quantity = req.quantity))]
pub async fn restock<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
    RequestActor(actor): RequestActor,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<InventoryRecord>, ApiError> {
    let record = state
        .ledger
        .increment(&ProductId::new(product_id), req.quantity, &actor)
        .await?;
    Ok(Json(record))
}

/// POST /inventory/{product_id}/remove takes units off the shelf outside
/// the order flow.
#[tracing::instrument(skip(state, actor, req), fields(quantity = req.quantity))]
pub async fn remove<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
    RequestActor(actor): RequestActor,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<InventoryRecord>, ApiError> {
    let record = state
        .ledger
        .decrement_direct(&ProductId::new(product_id), req.quantity, &actor)
        .await?;
    Ok(Json(record))
}

/// POST /inventory/availability
#[tracing::instrument(skip(state, query), fields(items = query.items.len()))]
pub async fn availability<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(query): Json<AvailabilityQuery>,
) -> Result<Json<Vec<Availability>>, ApiError> {
    let lines = state.ledger.check_availability(&query.items).await?;
    Ok(Json(lines))
}
