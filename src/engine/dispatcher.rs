use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::DispatchSettings;
use crate::directory::{CourierCandidate, CourierDirectory};
use crate::error::AppError;
use crate::models::assignment::{DispatchEvent, ExpiredOffer, FailureReason};
use crate::models::order::{DeliveryOrder, OrderStatus};
use crate::notify::{CourierMessage, Notifier};
use crate::observability::metrics::Metrics;
use crate::store::AssignmentStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Offer {
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub distance_km: f64,
    pub eta_minutes: u32,
    pub expires_at: DateTime<Utc>,
    pub attempt: u32,
}

/// What happened when an order was pushed to its next courier.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CascadeOutcome {
    Offered(Offer),
    NoCourierAvailable,
    Exhausted,
    /// Someone else concluded the offer or already re-offered the order.
    AlreadyHandled,
}

/// Offer lifecycle state machine. Every state change goes through one
/// `AssignmentStore` transaction; nothing here holds a lock across I/O.
pub struct Dispatcher {
    store: Arc<dyn AssignmentStore>,
    directory: Arc<dyn CourierDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
    metrics: Metrics,
    events_tx: broadcast::Sender<DispatchEvent>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn AssignmentStore>,
        directory: Arc<dyn CourierDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
        metrics: Metrics,
        event_buffer_size: usize,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        Self {
            store,
            directory,
            notifier,
            clock,
            settings,
            metrics,
            events_tx,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn AssignmentStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events_tx.subscribe()
    }

    /// Offers the order to the nearest courier it has not been offered to.
    pub async fn create_offer(&self, order_id: Uuid) -> Result<Offer, AppError> {
        let start = Instant::now();
        let result = self.try_create_offer(order_id).await;

        let outcome = match &result {
            Ok(_) => "offered",
            Err(AppError::NoCourierAvailable) => "no_courier",
            Err(AppError::Exhausted { .. }) => "exhausted",
            Err(AppError::NotEligible(_) | AppError::MissingLocation(_)) => "not_eligible",
            Err(_) => "error",
        };
        self.metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .dispatch_attempts_total
            .with_label_values(&[outcome])
            .inc();

        result
    }

    async fn try_create_offer(&self, order_id: Uuid) -> Result<Offer, AppError> {
        let order = self.store.load_order(order_id).await?;
        let assignment = &order.assignment;

        if order.status != OrderStatus::Ready {
            return Err(AppError::NotEligible(format!(
                "order {order_id} is {:?}",
                order.status
            )));
        }
        if assignment.assigned_courier_id.is_some() {
            return Err(AppError::NotEligible(format!(
                "order {order_id} already has a courier"
            )));
        }
        if assignment.offered_courier_id.is_some() {
            return Err(AppError::NotEligible(format!(
                "order {order_id} already has an open offer"
            )));
        }
        if assignment.requires_manual_dispatch
            || assignment.attempt_count >= self.settings.max_attempts
        {
            return Err(self.exhaust(order_id, assignment.attempt_count).await);
        }

        let origin = order.origin.ok_or(AppError::MissingLocation(order_id))?;
        let exclude: HashSet<Uuid> = assignment.attempted_courier_ids.iter().copied().collect();

        let candidates = self
            .directory
            .find_available(
                &origin,
                &exclude,
                self.settings.search_radius_km,
                self.settings.candidate_limit,
            )
            .await?;

        let Some(nearest) = candidates.into_iter().next() else {
            let now = self.clock.now();
            self.store.record_no_courier(order_id, now).await?;
            info!(
                order_id = %order_id,
                attempts = assignment.attempt_count,
                "no courier available"
            );
            self.publish(DispatchEvent::NoCourierAvailable { order_id, at: now });
            return Err(AppError::NoCourierAvailable);
        };

        let now = self.clock.now();
        let expires_at = now + self.settings.offer_ttl;
        let offered = match self
            .store
            .begin_offer(
                order_id,
                nearest.courier_id,
                expires_at,
                now,
                self.settings.max_attempts,
            )
            .await
        {
            Ok(order) => order,
            Err(AppError::Exhausted { attempts, .. }) => {
                return Err(self.exhaust(order_id, attempts).await);
            }
            Err(err) => return Err(err),
        };

        let offer = Offer {
            order_id,
            courier_id: nearest.courier_id,
            distance_km: nearest.distance_km,
            eta_minutes: nearest.eta_minutes,
            expires_at,
            attempt: offered.assignment.attempt_count,
        };

        self.metrics.offers_total.with_label_values(&["created"]).inc();
        self.notify_courier(&nearest, &offer);
        self.publish(DispatchEvent::OfferCreated {
            order_id,
            courier_id: offer.courier_id,
            distance_km: offer.distance_km,
            expires_at,
            attempt: offer.attempt,
        });

        info!(
            order_id = %order_id,
            courier_id = %offer.courier_id,
            distance_km = offer.distance_km,
            attempt = offer.attempt,
            "offer created"
        );

        Ok(offer)
    }

    pub async fn accept(&self, order_id: Uuid, courier_id: Uuid) -> Result<DeliveryOrder, AppError> {
        let now = self.clock.now();
        match self
            .store
            .accept(order_id, courier_id, now, self.settings.accept_grace)
            .await
        {
            Ok(order) => {
                self.metrics.offers_total.with_label_values(&["accepted"]).inc();
                self.publish(DispatchEvent::OfferAccepted {
                    order_id,
                    courier_id,
                    at: now,
                });
                info!(order_id = %order_id, courier_id = %courier_id, "offer accepted");
                Ok(order)
            }
            Err(AppError::StaleOffer) => {
                info!(order_id = %order_id, courier_id = %courier_id, "stale accept refused");
                Err(AppError::StaleOffer)
            }
            Err(err) => Err(err),
        }
    }

    /// Concludes the courier's offer and immediately cascades.
    pub async fn reject(&self, order_id: Uuid, courier_id: Uuid) -> Result<CascadeOutcome, AppError> {
        self.conclude(order_id, courier_id, FailureReason::Rejected)
            .await
    }

    /// Sweeper path for an offer whose deadline passed.
    pub async fn expire(&self, offer: &ExpiredOffer) -> Result<CascadeOutcome, AppError> {
        self.conclude(offer.order_id, offer.courier_id, FailureReason::Expired)
            .await
    }

    /// Re-runs `create_offer`, folding the expected non-offer outcomes into
    /// a `CascadeOutcome`.
    pub async fn cascade(&self, order_id: Uuid) -> Result<CascadeOutcome, AppError> {
        match self.create_offer(order_id).await {
            Ok(offer) => Ok(CascadeOutcome::Offered(offer)),
            Err(AppError::NoCourierAvailable) => Ok(CascadeOutcome::NoCourierAvailable),
            Err(AppError::Exhausted { .. }) => Ok(CascadeOutcome::Exhausted),
            Err(AppError::NotEligible(reason)) => {
                debug!(order_id = %order_id, reason = %reason, "cascade skipped");
                Ok(CascadeOutcome::AlreadyHandled)
            }
            Err(err) => Err(err),
        }
    }

    /// Nearest candidates for an order, for diagnostics and manual override.
    pub async fn candidates(&self, order_id: Uuid) -> Result<Vec<CourierCandidate>, AppError> {
        let order = self.store.load_order(order_id).await?;
        let origin = order.origin.ok_or(AppError::MissingLocation(order_id))?;
        let exclude: HashSet<Uuid> = order
            .assignment
            .attempted_courier_ids
            .iter()
            .copied()
            .collect();

        self.directory
            .find_available(
                &origin,
                &exclude,
                self.settings.search_radius_km,
                self.settings.candidate_limit,
            )
            .await
    }

    pub async fn exhausted_orders(&self) -> Result<Vec<DeliveryOrder>, AppError> {
        self.store.list_exhausted().await
    }

    async fn conclude(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        reason: FailureReason,
    ) -> Result<CascadeOutcome, AppError> {
        let now = self.clock.now();
        if !self
            .store
            .fail_offer(order_id, courier_id, reason, now)
            .await?
        {
            return Ok(CascadeOutcome::AlreadyHandled);
        }

        self.metrics
            .offers_total
            .with_label_values(&[reason.as_str()])
            .inc();
        self.publish(DispatchEvent::OfferFailed {
            order_id,
            courier_id,
            reason,
            at: now,
        });
        info!(
            order_id = %order_id,
            courier_id = %courier_id,
            reason = %reason,
            "offer failed; cascading"
        );

        self.cascade(order_id).await
    }

    /// Flags the order for manual dispatch and returns the error to surface.
    async fn exhaust(&self, order_id: Uuid, attempts: u32) -> AppError {
        let now = self.clock.now();
        match self.store.flag_exhausted(order_id, now).await {
            Ok(true) => {
                warn!(
                    order_id = %order_id,
                    attempts,
                    "attempts exhausted; order requires manual dispatch"
                );
                self.publish(DispatchEvent::Exhausted {
                    order_id,
                    attempts,
                    at: now,
                });
            }
            Ok(false) => {}
            Err(err) => return err,
        }
        AppError::Exhausted { order_id, attempts }
    }

    fn notify_courier(&self, candidate: &CourierCandidate, offer: &Offer) {
        let message = CourierMessage::OfferCreated {
            order_id: offer.order_id,
            expires_at: offer.expires_at,
            distance_km: offer.distance_km,
            eta_minutes: offer.eta_minutes,
        };
        if let Err(err) = self.notifier.notify(candidate.user_id, &message) {
            warn!(
                order_id = %offer.order_id,
                courier_id = %offer.courier_id,
                error = %err,
                "courier notification failed; offer stands"
            );
        }
    }

    fn publish(&self, event: DispatchEvent) {
        let _ = self.events_tx.send(event);
    }
}
