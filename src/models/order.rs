use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::assignment::Assignment;
use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Ready,
    DriverAssigned,
    Delivered,
    Cancelled,
}

/// Courier-facing status, kept alongside `OrderStatus`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Unassigned,
    Assigned,
    PickedUp,
    Delivered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub id: Uuid,
    pub status: OrderStatus,
    pub delivery_status: DeliveryStatus,
    /// Merchant pickup point.
    pub origin: Option<GeoPoint>,
    pub assignment: Assignment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryOrder {
    pub fn new(origin: Option<GeoPoint>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            delivery_status: DeliveryStatus::Unassigned,
            origin,
            assignment: Assignment::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
