use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CourierStatus {
    Available,
    Busy,
    Offline,
}

/// Only used for travel-time estimates, never for eligibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum VehicleClass {
    Bicycle,
    Scooter,
    #[default]
    Motorcycle,
    Car,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub location: Option<GeoPoint>,
    pub status: CourierStatus,
    pub is_active: bool,
    pub vehicle_class: VehicleClass,
    pub updated_at: DateTime<Utc>,
}

impl Courier {
    /// Available, active and located.
    pub fn is_dispatchable(&self) -> bool {
        self.status == CourierStatus::Available && self.is_active && self.location.is_some()
    }
}
