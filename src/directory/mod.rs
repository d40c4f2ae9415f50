//! Proximity search over dispatchable couriers.
//!
//! Two strategies sit behind [`CourierDirectory`]: [`IndexedDirectory`]
//! narrows the search through the grid index, [`ScanDirectory`] computes
//! Haversine distance for every dispatchable courier. Both rank through
//! [`rank_candidates`], so their output is identical for the same data.
//! [`FallbackDirectory`] prefers the index and drops to the scan when the
//! index errors.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::index::GridIndex;
use crate::geo::{estimate_travel_minutes, haversine_km};
use crate::models::courier::{Courier, GeoPoint, VehicleClass};
use crate::observability::metrics::Metrics;
use crate::store::CourierSource;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourierCandidate {
    pub courier_id: Uuid,
    pub user_id: Uuid,
    pub location: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub distance_km: f64,
    pub eta_minutes: u32,
}

#[async_trait]
pub trait CourierDirectory: Send + Sync {
    /// Nearest-first dispatchable couriers within `max_radius_km` of
    /// `origin`, skipping `exclude`, at most `limit` long. Ties go to the
    /// lower courier id. An empty result is not an error.
    async fn find_available(
        &self,
        origin: &GeoPoint,
        exclude: &HashSet<Uuid>,
        max_radius_km: f64,
        limit: usize,
    ) -> Result<Vec<CourierCandidate>, AppError>;
}

pub fn rank_candidates(
    origin: &GeoPoint,
    couriers: impl IntoIterator<Item = Courier>,
    exclude: &HashSet<Uuid>,
    max_radius_km: f64,
    limit: usize,
) -> Vec<CourierCandidate> {
    let mut candidates: Vec<CourierCandidate> = couriers
        .into_iter()
        .filter(|courier| courier.is_dispatchable() && !exclude.contains(&courier.id))
        .filter_map(|courier| {
            let location = courier.location?;
            let distance_km = haversine_km(origin, &location);
            (distance_km <= max_radius_km).then(|| CourierCandidate {
                courier_id: courier.id,
                user_id: courier.user_id,
                location,
                vehicle_class: courier.vehicle_class,
                distance_km,
                eta_minutes: estimate_travel_minutes(distance_km, courier.vehicle_class),
            })
        })
        .collect();

    candidates.sort_by(nearest_first);
    candidates.truncate(limit);
    candidates
}

fn nearest_first(a: &CourierCandidate, b: &CourierCandidate) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| a.courier_id.cmp(&b.courier_id))
}

pub struct ScanDirectory {
    source: Arc<dyn CourierSource>,
}

impl ScanDirectory {
    pub fn new(source: Arc<dyn CourierSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl CourierDirectory for ScanDirectory {
    async fn find_available(
        &self,
        origin: &GeoPoint,
        exclude: &HashSet<Uuid>,
        max_radius_km: f64,
        limit: usize,
    ) -> Result<Vec<CourierCandidate>, AppError> {
        let couriers = self.source.dispatchable_couriers().await?;
        Ok(rank_candidates(origin, couriers, exclude, max_radius_km, limit))
    }
}

pub struct IndexedDirectory {
    index: Arc<GridIndex>,
    source: Arc<dyn CourierSource>,
}

impl IndexedDirectory {
    pub fn new(index: Arc<GridIndex>, source: Arc<dyn CourierSource>) -> Self {
        Self { index, source }
    }
}

#[async_trait]
impl CourierDirectory for IndexedDirectory {
    async fn find_available(
        &self,
        origin: &GeoPoint,
        exclude: &HashSet<Uuid>,
        max_radius_km: f64,
        limit: usize,
    ) -> Result<Vec<CourierCandidate>, AppError> {
        let mut ids = self.index.candidates_within(origin, max_radius_km)?;
        ids.retain(|id| !exclude.contains(id));
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let couriers = self.source.couriers_by_id(&ids).await?;
        Ok(rank_candidates(origin, couriers, exclude, max_radius_km, limit))
    }
}

pub struct FallbackDirectory {
    primary: Option<IndexedDirectory>,
    fallback: ScanDirectory,
    metrics: Metrics,
}

impl FallbackDirectory {
    pub fn new(primary: Option<IndexedDirectory>, fallback: ScanDirectory, metrics: Metrics) -> Self {
        Self {
            primary,
            fallback,
            metrics,
        }
    }
}

#[async_trait]
impl CourierDirectory for FallbackDirectory {
    async fn find_available(
        &self,
        origin: &GeoPoint,
        exclude: &HashSet<Uuid>,
        max_radius_km: f64,
        limit: usize,
    ) -> Result<Vec<CourierCandidate>, AppError> {
        if let Some(primary) = &self.primary {
            match primary
                .find_available(origin, exclude, max_radius_km, limit)
                .await
            {
                Ok(candidates) => return Ok(candidates),
                Err(err) => {
                    self.metrics.directory_fallbacks_total.inc();
                    warn!(error = %err, "geospatial index query failed; scanning couriers instead");
                }
            }
        }

        self.fallback
            .find_available(origin, exclude, max_radius_km, limit)
            .await
    }
}
