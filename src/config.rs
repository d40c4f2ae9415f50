use std::env;

use chrono::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub order_queue_size: usize,
    pub event_buffer_size: usize,
    pub geo_index_enabled: bool,
    pub dispatch: DispatchSettings,
}

/// Knobs of the offer lifecycle.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub offer_ttl: Duration,
    pub sweep_interval: std::time::Duration,
    pub max_attempts: u32,
    pub search_radius_km: f64,
    pub accept_grace: Duration,
    pub candidate_limit: usize,
    pub stalled_retry_after: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            offer_ttl: Duration::minutes(5),
            sweep_interval: std::time::Duration::from_secs(10),
            max_attempts: 5,
            search_radius_km: 20.0,
            accept_grace: Duration::seconds(10),
            candidate_limit: 5,
            stalled_retry_after: Duration::seconds(30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            order_queue_size: 1024,
            event_buffer_size: 1024,
            geo_index_enabled: true,
            dispatch: DispatchSettings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let dispatch = DispatchSettings {
            offer_ttl: Duration::seconds(parse_or_default("OFFER_TTL_SECONDS", 300)?),
            sweep_interval: std::time::Duration::from_secs(parse_or_default(
                "SWEEP_INTERVAL_SECONDS",
                10,
            )?),
            max_attempts: parse_or_default("MAX_ATTEMPTS", 5)?,
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", 20.0)?,
            accept_grace: Duration::seconds(parse_or_default("ACCEPT_GRACE_SECONDS", 10)?),
            candidate_limit: parse_or_default("CANDIDATE_LIMIT", 5)?,
            stalled_retry_after: Duration::seconds(parse_or_default("STALLED_RETRY_SECONDS", 30)?),
        };
        dispatch.validate()?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            geo_index_enabled: parse_or_default("GEO_INDEX_ENABLED", true)?,
            dispatch,
        })
    }
}

impl DispatchSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_attempts == 0 {
            return Err(AppError::Config("MAX_ATTEMPTS must be >= 1".to_string()));
        }
        if !(self.search_radius_km > 0.0) {
            return Err(AppError::Config("SEARCH_RADIUS_KM must be > 0".to_string()));
        }
        if self.candidate_limit == 0 {
            return Err(AppError::Config("CANDIDATE_LIMIT must be >= 1".to_string()));
        }
        if self.offer_ttl <= Duration::zero() {
            return Err(AppError::Config("OFFER_TTL_SECONDS must be > 0".to_string()));
        }
        if self.sweep_interval.is_zero() {
            return Err(AppError::Config(
                "SWEEP_INTERVAL_SECONDS must be > 0".to_string(),
            ));
        }
        if self.accept_grace < Duration::zero() {
            return Err(AppError::Config(
                "ACCEPT_GRACE_SECONDS must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Config(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = DispatchSettings::default();

        assert_eq!(settings.offer_ttl, Duration::minutes(5));
        assert_eq!(settings.sweep_interval, std::time::Duration::from_secs(10));
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.search_radius_km, 20.0);
        assert_eq!(settings.accept_grace, Duration::seconds(10));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        let settings = DispatchSettings {
            max_attempts: 0,
            ..DispatchSettings::default()
        };
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        let settings = DispatchSettings {
            search_radius_km: 0.0,
            ..DispatchSettings::default()
        };
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));
    }
}
