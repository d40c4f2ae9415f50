use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::CourierCandidate;
use crate::engine::dispatcher::CascadeOutcome;
use crate::engine::queue::enqueue_ready;
use crate::error::AppError;
use crate::models::assignment::DispatchState;
use crate::models::courier::GeoPoint;
use crate::models::order::DeliveryOrder;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/ready", post(mark_ready))
        .route("/orders/:id/accept", post(accept_offer))
        .route("/orders/:id/reject", post(reject_offer))
        .route("/orders/:id/candidates", get(list_candidates))
        .route("/dispatch/exhausted", get(list_exhausted))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub origin: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct OfferDecisionRequest {
    pub courier_id: Uuid,
}

#[derive(Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: DeliveryOrder,
    pub dispatch_state: DispatchState,
}

impl From<DeliveryOrder> for OrderView {
    fn from(order: DeliveryOrder) -> Self {
        let dispatch_state = order.assignment.state();
        Self {
            order,
            dispatch_state,
        }
    }
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<OrderView>, AppError> {
    let order = DeliveryOrder::new(payload.origin, state.clock.now());
    state.store.insert_order(order.clone());
    Ok(Json(order.into()))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(state.store.get_order(id)?.into()))
}

async fn mark_ready(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = state.store.mark_ready(id, state.clock.now())?;
    enqueue_ready(&state, id).await?;
    Ok(Json(order.into()))
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferDecisionRequest>,
) -> Result<Json<OrderView>, AppError> {
    let order = state.dispatcher.accept(id, payload.courier_id).await?;
    Ok(Json(order.into()))
}

async fn reject_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferDecisionRequest>,
) -> Result<Json<CascadeOutcome>, AppError> {
    let outcome = state.dispatcher.reject(id, payload.courier_id).await?;
    Ok(Json(outcome))
}

async fn list_candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CourierCandidate>>, AppError> {
    Ok(Json(state.dispatcher.candidates(id).await?))
}

async fn list_exhausted(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OrderView>>, AppError> {
    let orders = state.dispatcher.exhausted_orders().await?;
    Ok(Json(orders.into_iter().map(OrderView::from).collect()))
}
