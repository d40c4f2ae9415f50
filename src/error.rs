use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("order not eligible for dispatch: {0}")]
    NotEligible(String),

    #[error("order {0} has no pickup location")]
    MissingLocation(Uuid),

    #[error("offer no longer valid")]
    StaleOffer,

    #[error("no couriers available")]
    NoCourierAvailable,

    #[error("order {order_id} exhausted after {attempts} attempts; manual dispatch required")]
    Exhausted { order_id: Uuid, attempts: u32 },

    #[error("geospatial index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for clients.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotEligible(_) => "not_eligible",
            AppError::MissingLocation(_) => "missing_location",
            AppError::StaleOffer => "stale_offer",
            AppError::NoCourierAvailable => "no_courier_available",
            AppError::Exhausted { .. } => "exhausted",
            AppError::IndexUnavailable(_) => "index_unavailable",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotEligible(_) | AppError::StaleOffer | AppError::Exhausted { .. } => {
                StatusCode::CONFLICT
            }
            AppError::MissingLocation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NoCourierAvailable | AppError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::IndexUnavailable(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "reason": self.reason(),
        }));

        (status, body).into_response()
    }
}
