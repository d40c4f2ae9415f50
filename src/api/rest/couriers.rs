use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{patch, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierStatus, GeoPoint, VehicleClass};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id/status", patch(update_courier_status))
        .route("/couriers/:id/location", patch(update_courier_location))
        .route("/couriers/:id/active", patch(update_courier_active))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub user_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub vehicle_class: VehicleClass,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CourierStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateActiveRequest {
    pub is_active: bool,
}

fn validate_location(location: &Option<GeoPoint>) -> Result<(), AppError> {
    if let Some(point) = location {
        if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
            return Err(AppError::BadRequest(format!(
                "location out of range: ({}, {})",
                point.lat, point.lng
            )));
        }
    }
    Ok(())
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    validate_location(&payload.location)?;

    let courier = Courier {
        id: Uuid::new_v4(),
        user_id: payload.user_id.unwrap_or_else(Uuid::new_v4),
        name: payload.name,
        location: payload.location,
        status: CourierStatus::Available,
        is_active: true,
        vehicle_class: payload.vehicle_class,
        updated_at: state.clock.now(),
    };

    state.store.insert_courier(courier.clone());
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    Json(state.store.list_couriers())
}

async fn update_courier_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Courier>, AppError> {
    let courier = state
        .store
        .update_courier_status(id, payload.status, state.clock.now())?;
    Ok(Json(courier))
}

async fn update_courier_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Courier>, AppError> {
    validate_location(&payload.location)?;
    let courier = state
        .store
        .update_courier_location(id, payload.location, state.clock.now())?;
    Ok(Json(courier))
}

async fn update_courier_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateActiveRequest>,
) -> Result<Json<Courier>, AppError> {
    let courier = state
        .store
        .set_courier_active(id, payload.is_active, state.clock.now())?;
    Ok(Json(courier))
}
