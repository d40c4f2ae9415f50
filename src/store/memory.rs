use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::index::GridIndex;
use crate::models::assignment::{ExpiredOffer, FailureReason};
use crate::models::courier::{Courier, CourierStatus, GeoPoint};
use crate::models::order::{DeliveryOrder, DeliveryStatus, OrderStatus};
use crate::store::{AssignmentStore, CourierSource};

/// DashMap-backed store. A transaction is the span during which the
/// order's entry guard is held; `accept` additionally takes the courier's
/// guard, always after the order's.
pub struct MemoryStore {
    orders: DashMap<Uuid, DeliveryOrder>,
    couriers: DashMap<Uuid, Courier>,
    index: Option<Arc<GridIndex>>,
}

impl MemoryStore {
    pub fn new(index: Option<Arc<GridIndex>>) -> Self {
        Self {
            orders: DashMap::new(),
            couriers: DashMap::new(),
            index,
        }
    }

    pub fn courier_count(&self) -> usize {
        self.couriers.len()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn insert_courier(&self, courier: Courier) {
        self.sync_index(courier.id, courier.location);
        self.couriers.insert(courier.id, courier);
    }

    pub fn list_couriers(&self) -> Vec<Courier> {
        self.couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_courier(&self, courier_id: Uuid) -> Result<Courier, AppError> {
        self.couriers
            .get(&courier_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))
    }

    pub fn update_courier_status(
        &self,
        courier_id: Uuid,
        status: CourierStatus,
        now: DateTime<Utc>,
    ) -> Result<Courier, AppError> {
        let mut courier = self
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;

        courier.status = status;
        courier.updated_at = now;
        Ok(courier.clone())
    }

    pub fn update_courier_location(
        &self,
        courier_id: Uuid,
        location: Option<GeoPoint>,
        now: DateTime<Utc>,
    ) -> Result<Courier, AppError> {
        let mut courier = self
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;

        courier.location = location;
        courier.updated_at = now;
        self.sync_index(courier_id, location);
        Ok(courier.clone())
    }

    pub fn set_courier_active(
        &self,
        courier_id: Uuid,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<Courier, AppError> {
        let mut courier = self
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;

        courier.is_active = is_active;
        courier.updated_at = now;
        Ok(courier.clone())
    }

    pub fn insert_order(&self, order: DeliveryOrder) {
        self.orders.insert(order.id, order);
    }

    pub fn get_order(&self, order_id: Uuid) -> Result<DeliveryOrder, AppError> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
    }

    /// PENDING -> READY. Marking an already READY order is a no-op.
    pub fn mark_ready(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<DeliveryOrder, AppError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        let status = order.status;
        match status {
            OrderStatus::Pending => {
                order.status = OrderStatus::Ready;
                order.updated_at = now;
            }
            OrderStatus::Ready => {}
            other => {
                return Err(AppError::NotEligible(format!(
                    "order {order_id} is {other:?}, cannot become ready"
                )));
            }
        }

        Ok(order.clone())
    }

    fn sync_index(&self, courier_id: Uuid, location: Option<GeoPoint>) {
        if let Some(index) = &self.index {
            index.upsert(courier_id, location);
        }
    }
}

#[async_trait]
impl CourierSource for MemoryStore {
    async fn dispatchable_couriers(&self) -> Result<Vec<Courier>, AppError> {
        Ok(self
            .couriers
            .iter()
            .filter(|entry| entry.value().is_dispatchable())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn couriers_by_id(&self, ids: &[Uuid]) -> Result<Vec<Courier>, AppError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.couriers.get(id).map(|entry| entry.value().clone()))
            .collect())
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn load_order(&self, order_id: Uuid) -> Result<DeliveryOrder, AppError> {
        self.get_order(order_id)
    }

    async fn begin_offer(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<DeliveryOrder, AppError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.status != OrderStatus::Ready {
            return Err(AppError::NotEligible(format!(
                "order {order_id} is {:?}",
                order.status
            )));
        }
        if order.assignment.assigned_courier_id.is_some() {
            return Err(AppError::NotEligible(format!(
                "order {order_id} already has a courier"
            )));
        }
        if order.assignment.offered_courier_id.is_some() {
            return Err(AppError::NotEligible(format!(
                "order {order_id} already has an open offer"
            )));
        }
        if order.assignment.requires_manual_dispatch || order.assignment.attempt_count >= max_attempts
        {
            return Err(AppError::Exhausted {
                order_id,
                attempts: order.assignment.attempt_count,
            });
        }
        if order.assignment.has_attempted(&courier_id) {
            return Err(AppError::NotEligible(format!(
                "courier {courier_id} was already offered order {order_id}"
            )));
        }

        order.assignment.offered_courier_id = Some(courier_id);
        order.assignment.offer_expires_at = Some(expires_at);
        order.assignment.attempt_count += 1;
        order.assignment.last_assignment_at = Some(now);
        order.updated_at = now;

        Ok(order.clone())
    }

    async fn accept(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<DeliveryOrder, AppError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.assignment.assigned_courier_id.is_some()
            || order.assignment.offered_courier_id != Some(courier_id)
        {
            return Err(AppError::StaleOffer);
        }
        let deadline = order
            .assignment
            .offer_expires_at
            .ok_or_else(|| AppError::Internal(format!("order {order_id} offer has no expiry")))?;
        if now > deadline + grace {
            return Err(AppError::StaleOffer);
        }

        let mut courier = self
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;
        if courier.status != CourierStatus::Available || !courier.is_active {
            return Err(AppError::NotEligible(format!(
                "courier {courier_id} is no longer available"
            )));
        }

        order.assignment.assigned_courier_id = Some(courier_id);
        order.assignment.clear_offer();
        order.assignment.record_attempted(courier_id);
        order.status = OrderStatus::DriverAssigned;
        order.delivery_status = DeliveryStatus::Assigned;
        order.updated_at = now;

        courier.status = CourierStatus::Busy;
        courier.updated_at = now;

        Ok(order.clone())
    }

    async fn fail_offer(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        reason: FailureReason,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.assignment.offered_courier_id != Some(courier_id) {
            debug!(
                order_id = %order_id,
                courier_id = %courier_id,
                reason = %reason,
                "offer already concluded"
            );
            return Ok(false);
        }

        order.assignment.record_attempted(courier_id);
        order.assignment.clear_offer();
        order.updated_at = now;

        Ok(true)
    }

    async fn list_expired_offers(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredOffer>, AppError> {
        let mut expired: Vec<ExpiredOffer> = self
            .orders
            .iter()
            .filter_map(|entry| {
                let assignment = &entry.value().assignment;
                if assignment.assigned_courier_id.is_some() {
                    return None;
                }
                match (assignment.offered_courier_id, assignment.offer_expires_at) {
                    (Some(courier_id), Some(expires_at)) if expires_at < now => Some(ExpiredOffer {
                        order_id: *entry.key(),
                        courier_id,
                        expired_at: expires_at,
                    }),
                    _ => None,
                }
            })
            .collect();

        expired.sort_by_key(|offer| (offer.expired_at, offer.order_id));
        Ok(expired)
    }

    async fn record_no_courier(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        order.assignment.no_courier_count += 1;
        order.assignment.last_assignment_at = Some(now);
        order.updated_at = now;
        Ok(())
    }

    async fn flag_exhausted(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.assignment.requires_manual_dispatch {
            return Ok(false);
        }
        order.assignment.requires_manual_dispatch = true;
        order.updated_at = now;
        Ok(true)
    }

    async fn list_stalled_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                let assignment = &order.assignment;
                order.status == OrderStatus::Ready
                    && order.origin.is_some()
                    && assignment.assigned_courier_id.is_none()
                    && assignment.offered_courier_id.is_none()
                    && !assignment.requires_manual_dispatch
                    && assignment.last_assignment_at.unwrap_or(order.updated_at) <= cutoff
            })
            .map(|entry| *entry.key())
            .collect())
    }

    async fn list_exhausted(&self) -> Result<Vec<DeliveryOrder>, AppError> {
        let mut orders: Vec<DeliveryOrder> = self
            .orders
            .iter()
            .filter(|entry| {
                let assignment = &entry.value().assignment;
                assignment.requires_manual_dispatch && assignment.assigned_courier_id.is_none()
            })
            .map(|entry| entry.value().clone())
            .collect();

        orders.sort_by_key(|order| (order.created_at, order.id));
        Ok(orders)
    }
}
