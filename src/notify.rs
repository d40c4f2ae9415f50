use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CourierMessage {
    OfferCreated {
        order_id: Uuid,
        expires_at: DateTime<Utc>,
        distance_km: f64,
        eta_minutes: u32,
    },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Push channel to a courier's device. Implementations must not block;
/// callers treat failures as best-effort.
pub trait Notifier: Send + Sync {
    fn notify(&self, courier_user_id: Uuid, message: &CourierMessage) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of a push provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, courier_user_id: Uuid, message: &CourierMessage) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(message).map_err(|err| NotifyError::Delivery(err.to_string()))?;
        info!(courier_user_id = %courier_user_id, payload = %payload, "courier notified");
        Ok(())
    }
}
