//! In-process geospatial index over courier positions.
//!
//! Couriers are bucketed into fixed-size lat/lng cells. A radius query
//! returns every courier in the cells overlapping the query's bounding box,
//! which is a superset of the couriers inside the radius; callers compute
//! exact distances on the result.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::EARTH_RADIUS_KM;
use crate::models::courier::GeoPoint;

const CELL_DEGREES: f64 = 0.1;
const LNG_CELLS: i64 = 3_600;
const LAT_CELLS: i64 = 1_800;

type Cell = (i64, i64);

pub struct GridIndex {
    cells: DashMap<Cell, HashSet<Uuid>>,
    positions: DashMap<Uuid, Cell>,
    online: AtomicBool,
}

impl Default for GridIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl GridIndex {
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
            positions: DashMap::new(),
            online: AtomicBool::new(true),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Inserts or moves a courier. `None` removes it.
    pub fn upsert(&self, courier_id: Uuid, location: Option<GeoPoint>) {
        let Some(location) = location else {
            self.remove(&courier_id);
            return;
        };

        let cell = cell_of(&location);
        if let Some(previous) = self.positions.insert(courier_id, cell) {
            if previous == cell {
                return;
            }
            self.detach(previous, &courier_id);
        }
        self.cells.entry(cell).or_default().insert(courier_id);
    }

    pub fn remove(&self, courier_id: &Uuid) {
        if let Some((_, cell)) = self.positions.remove(courier_id) {
            self.detach(cell, courier_id);
        }
    }

    /// Couriers that may lie within `radius_km` of `origin`, unordered.
    pub fn candidates_within(
        &self,
        origin: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Uuid>, AppError> {
        if !self.is_online() {
            return Err(AppError::IndexUnavailable("grid index offline".to_string()));
        }

        let radius_deg = (radius_km.max(0.0) / EARTH_RADIUS_KM).to_degrees();
        let (lat_lo, lat_hi) = (origin.lat - radius_deg, origin.lat + radius_deg);

        let lat_from = (lat_index(lat_lo) - 1).max(0);
        let lat_to = (lat_index(lat_hi) + 1).min(LAT_CELLS);

        // Widest longitude span is at the poleward edge of the box.
        let poleward = lat_lo.abs().max(lat_hi.abs());
        let lng_cols: Vec<i64> = if poleward >= 89.0 {
            (0..LNG_CELLS).collect()
        } else {
            let lng_deg = radius_deg / poleward.to_radians().cos();
            if lng_deg >= 180.0 {
                (0..LNG_CELLS).collect()
            } else {
                let from = raw_lng_index(origin.lng - lng_deg) - 1;
                let to = raw_lng_index(origin.lng + lng_deg) + 1;
                let mut cols: Vec<i64> = (from..=to).map(wrap_lng).collect();
                cols.sort_unstable();
                cols.dedup();
                cols
            }
        };

        let mut found = Vec::new();
        for lat in lat_from..=lat_to {
            for &lng in &lng_cols {
                if let Some(bucket) = self.cells.get(&(lat, lng)) {
                    found.extend(bucket.iter().copied());
                }
            }
        }

        Ok(found)
    }

    fn detach(&self, cell: Cell, courier_id: &Uuid) {
        let emptied = match self.cells.get_mut(&cell) {
            Some(mut bucket) => {
                bucket.remove(courier_id);
                bucket.is_empty()
            }
            None => false,
        };
        if emptied {
            self.cells.remove_if(&cell, |_, bucket| bucket.is_empty());
        }
    }
}

fn lat_index(lat: f64) -> i64 {
    (((lat.clamp(-90.0, 90.0) + 90.0) / CELL_DEGREES).floor() as i64).min(LAT_CELLS)
}

fn raw_lng_index(lng: f64) -> i64 {
    ((lng + 180.0) / CELL_DEGREES).floor() as i64
}

fn wrap_lng(index: i64) -> i64 {
    index.rem_euclid(LNG_CELLS)
}

fn cell_of(point: &GeoPoint) -> Cell {
    (lat_index(point.lat), wrap_lng(raw_lng_index(point.lng)))
}
