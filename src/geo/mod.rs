pub mod index;

use crate::models::courier::{GeoPoint, VehicleClass};

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

const MIN_ETA_MINUTES: u32 = 2;
const MAX_ETA_MINUTES: u32 = 60;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Average urban speed in km/h.
fn average_speed_kmh(vehicle_class: VehicleClass) -> f64 {
    match vehicle_class {
        VehicleClass::Bicycle => 15.0,
        VehicleClass::Scooter => 25.0,
        VehicleClass::Motorcycle => 30.0,
        VehicleClass::Car => 25.0,
        VehicleClass::Unknown => average_speed_kmh(VehicleClass::default()),
    }
}

/// Rounded-up travel time, clamped to `[2, 60]` minutes.
pub fn estimate_travel_minutes(distance_km: f64, vehicle_class: VehicleClass) -> u32 {
    let minutes = (distance_km.max(0.0) * 60.0 / average_speed_kmh(vehicle_class)).ceil();
    (minutes as u32).clamp(MIN_ETA_MINUTES, MAX_ETA_MINUTES)
}
