use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dispatch lifecycle of one order, embedded in the order record.
///
/// At most one of `assigned_courier_id` / `offered_courier_id` is set.
/// `attempted_courier_ids` is append-only and duplicate-free.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub assigned_courier_id: Option<Uuid>,
    pub offered_courier_id: Option<Uuid>,
    pub offer_expires_at: Option<DateTime<Utc>>,
    pub attempted_courier_ids: Vec<Uuid>,
    pub attempt_count: u32,
    pub no_courier_count: u32,
    pub last_assignment_at: Option<DateTime<Utc>>,
    pub requires_manual_dispatch: bool,
}

impl Assignment {
    pub fn state(&self) -> DispatchState {
        if self.assigned_courier_id.is_some() {
            DispatchState::Accepted
        } else if self.offered_courier_id.is_some() {
            DispatchState::OfferPending
        } else if self.requires_manual_dispatch {
            DispatchState::Exhausted
        } else {
            DispatchState::Unoffered
        }
    }

    pub fn has_attempted(&self, courier_id: &Uuid) -> bool {
        self.attempted_courier_ids.contains(courier_id)
    }

    pub(crate) fn record_attempted(&mut self, courier_id: Uuid) {
        if !self.has_attempted(&courier_id) {
            self.attempted_courier_ids.push(courier_id);
        }
    }

    pub(crate) fn clear_offer(&mut self) {
        self.offered_courier_id = None;
        self.offer_expires_at = None;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchState {
    Unoffered,
    OfferPending,
    Accepted,
    Exhausted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Rejected,
    Expired,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Rejected => "rejected",
            FailureReason::Expired => "expired",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open offer whose deadline has passed, as seen by the sweeper.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredOffer {
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    OfferCreated {
        order_id: Uuid,
        courier_id: Uuid,
        distance_km: f64,
        expires_at: DateTime<Utc>,
        attempt: u32,
    },
    OfferAccepted {
        order_id: Uuid,
        courier_id: Uuid,
        at: DateTime<Utc>,
    },
    OfferFailed {
        order_id: Uuid,
        courier_id: Uuid,
        reason: FailureReason,
        at: DateTime<Utc>,
    },
    NoCourierAvailable {
        order_id: Uuid,
        at: DateTime<Utc>,
    },
    Exhausted {
        order_id: Uuid,
        attempts: u32,
        at: DateTime<Utc>,
    },
}
