use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use courier_dispatch::clock::{Clock, ManualClock};
use courier_dispatch::config::DispatchSettings;
use courier_dispatch::directory::ScanDirectory;
use courier_dispatch::engine::dispatcher::Dispatcher;
use courier_dispatch::engine::sweeper::{run_expiry_sweeper, sweep_once};
use courier_dispatch::error::AppError;
use courier_dispatch::models::assignment::{ExpiredOffer, FailureReason};
use courier_dispatch::models::courier::{Courier, CourierStatus, GeoPoint, VehicleClass};
use courier_dispatch::models::order::DeliveryOrder;
use courier_dispatch::notify::TracingNotifier;
use courier_dispatch::observability::metrics::Metrics;
use courier_dispatch::store::{AssignmentStore, MemoryStore};

/// Delegates to a `MemoryStore` but fails `fail_offer` for one order.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    poisoned: Uuid,
}

#[async_trait]
impl AssignmentStore for FlakyStore {
    async fn load_order(&self, order_id: Uuid) -> Result<DeliveryOrder, AppError> {
        self.inner.load_order(order_id).await
    }

    async fn begin_offer(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<DeliveryOrder, AppError> {
        self.inner
            .begin_offer(order_id, courier_id, expires_at, now, max_attempts)
            .await
    }

    async fn accept(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<DeliveryOrder, AppError> {
        self.inner.accept(order_id, courier_id, now, grace).await
    }

    async fn fail_offer(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        reason: FailureReason,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        if order_id == self.poisoned {
            return Err(AppError::StoreUnavailable("connection reset".to_string()));
        }
        self.inner.fail_offer(order_id, courier_id, reason, now).await
    }

    async fn list_expired_offers(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredOffer>, AppError> {
        self.inner.list_expired_offers(now).await
    }

    async fn record_no_courier(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        self.inner.record_no_courier(order_id, now).await
    }

    async fn flag_exhausted(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.inner.flag_exhausted(order_id, now).await
    }

    async fn list_stalled_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        self.inner.list_stalled_orders(cutoff).await
    }

    async fn list_exhausted(&self) -> Result<Vec<DeliveryOrder>, AppError> {
        self.inner.list_exhausted().await
    }
}

const PICKUP: GeoPoint = GeoPoint {
    lat: 40.4168,
    lng: -3.7038,
};

fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-15T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn courier(seed: u128, lat_offset: f64) -> Courier {
    Courier {
        id: Uuid::from_u128(seed),
        user_id: Uuid::from_u128(seed + 500),
        name: format!("courier-{seed}"),
        location: Some(GeoPoint {
            lat: PICKUP.lat + lat_offset,
            lng: PICKUP.lng,
        }),
        status: CourierStatus::Available,
        is_active: true,
        vehicle_class: VehicleClass::Car,
        updated_at: start_time(),
    }
}

fn ready_order(store: &MemoryStore, now: DateTime<Utc>) -> Uuid {
    let order = DeliveryOrder::new(Some(PICKUP), now);
    let id = order.id;
    store.insert_order(order);
    store.mark_ready(id, now).unwrap();
    id
}

struct Setup {
    store: Arc<MemoryStore>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<ManualClock>,
    healthy: Uuid,
    poisoned: Uuid,
}

async fn setup(settings: DispatchSettings) -> Setup {
    let clock = Arc::new(ManualClock::new(start_time()));
    let store = Arc::new(MemoryStore::new(None));
    for seed in 1..=4 {
        store.insert_courier(courier(seed, seed as f64 * 0.01));
    }

    let healthy = ready_order(&store, clock.now());
    let poisoned = ready_order(&store, clock.now());
    let flaky = Arc::new(FlakyStore {
        inner: store.clone(),
        poisoned,
    });

    let dispatcher = Arc::new(Dispatcher::new(
        flaky,
        Arc::new(ScanDirectory::new(store.clone())),
        Arc::new(TracingNotifier),
        clock.clone(),
        settings,
        Metrics::new(),
        16,
    ));

    dispatcher.create_offer(poisoned).await.unwrap();
    dispatcher.create_offer(healthy).await.unwrap();

    Setup {
        store,
        dispatcher,
        clock,
        healthy,
        poisoned,
    }
}

#[tokio::test]
async fn one_failing_order_does_not_stall_the_tick() {
    let s = setup(DispatchSettings::default()).await;
    let before = s.store.get_order(s.healthy).unwrap();
    let first_courier = before.assignment.offered_courier_id.unwrap();

    s.clock.advance(Duration::minutes(5) + Duration::seconds(1));
    let report = sweep_once(&s.dispatcher).await;

    assert_eq!(report.expired, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(report.reoffered, 1);
    assert_eq!(s.dispatcher.metrics().sweep_failures_total.get(), 1);
    assert_eq!(s.dispatcher.metrics().sweeps_total.get(), 1);

    let healthy = s.store.get_order(s.healthy).unwrap();
    assert_eq!(healthy.assignment.attempted_courier_ids, vec![first_courier]);
    assert!(healthy.assignment.offered_courier_id.is_some());
    assert_ne!(healthy.assignment.offered_courier_id, Some(first_courier));

    let poisoned = s.store.get_order(s.poisoned).unwrap();
    assert!(poisoned.assignment.offered_courier_id.is_some());
    assert!(poisoned.assignment.attempted_courier_ids.is_empty());
}

#[tokio::test]
async fn nothing_expires_before_the_deadline() {
    let s = setup(DispatchSettings::default()).await;

    s.clock.advance(Duration::minutes(5));
    let report = sweep_once(&s.dispatcher).await;

    assert_eq!(report.expired, 0);
    assert_eq!(report.failures, 0);
}

#[tokio::test]
async fn sweeper_loop_stops_on_shutdown() {
    let settings = DispatchSettings {
        sweep_interval: std::time::Duration::from_millis(20),
        ..DispatchSettings::default()
    };
    let s = setup(settings).await;
    s.clock.advance(Duration::minutes(6));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_expiry_sweeper(s.dispatcher.clone(), shutdown_rx));

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("sweeper did not stop")
        .unwrap();

    assert!(s.dispatcher.metrics().sweeps_total.get() >= 1);
    let healthy = s.store.get_order(s.healthy).unwrap();
    assert_eq!(healthy.assignment.attempted_courier_ids.len(), 1);
}
