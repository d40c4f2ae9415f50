pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::{ExpiredOffer, FailureReason};
use crate::models::courier::Courier;
use crate::models::order::DeliveryOrder;

pub use memory::MemoryStore;

/// Read side of the courier records, as needed by the directory.
#[async_trait]
pub trait CourierSource: Send + Sync {
    /// Couriers that are available, active and located.
    async fn dispatchable_couriers(&self) -> Result<Vec<Courier>, AppError>;

    /// Records for the given ids; unknown ids are skipped.
    async fn couriers_by_id(&self, ids: &[Uuid]) -> Result<Vec<Courier>, AppError>;
}

/// Persisted dispatch state of orders. Every method is one transaction:
/// checks and writes happen atomically under the store's isolation.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn load_order(&self, order_id: Uuid) -> Result<DeliveryOrder, AppError>;

    /// Opens an offer on a READY order that has neither an open offer nor an
    /// accepted courier, and bumps `attempt_count`.
    async fn begin_offer(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<DeliveryOrder, AppError>;

    /// Converts the open offer held by `courier_id` into the assignment and
    /// marks the courier busy.
    async fn accept(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<DeliveryOrder, AppError>;

    /// Concludes `courier_id`'s offer without acceptance. Returns `false`
    /// when that offer was already concluded.
    async fn fail_offer(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        reason: FailureReason,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Open, unaccepted offers whose deadline is strictly before `now`.
    async fn list_expired_offers(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredOffer>, AppError>;

    async fn record_no_courier(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError>;

    /// Sets the manual-dispatch flag. Returns `true` if it was not set before.
    async fn flag_exhausted(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// Located READY orders with no open offer, no courier, not exhausted,
    /// and no assignment activity (or, before any, no update) since `cutoff`.
    async fn list_stalled_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError>;

    async fn list_exhausted(&self) -> Result<Vec<DeliveryOrder>, AppError>;
}
