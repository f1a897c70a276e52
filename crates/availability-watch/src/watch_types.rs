use std::fmt;
use std::time::Duration;

use reservauto::ApiError;
use serde::Serialize;

/// Configuration of the polling loop
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    /// Time between the start of two passes (default: 60 seconds)
    pub interval: Duration,

    /// Whether station vehicles are checked (default: true)
    pub stations_enabled: bool,

    /// Whether flex vehicles are checked (default: true)
    pub flex_enabled: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stations_enabled: true,
            flex_enabled: true,
        }
    }
}

impl WatcherConfig {
    /// Build the configuration from `WATCH_INTERVAL_SECS`, `WATCH_STATIONS` and `WATCH_FLEX`
    pub fn from_env() -> Result<Self, WatchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let interval = match lookup("WATCH_INTERVAL_SECS") {
            Some(value) => {
                let secs = value.trim().parse::<u64>().map_err(|e| {
                    WatchError::ConfigError(format!("Invalid WATCH_INTERVAL_SECS '{}': {}", value, e))
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.interval,
        };

        let stations_enabled = match lookup("WATCH_STATIONS") {
            Some(value) => parse_flag("WATCH_STATIONS", &value)?,
            None => defaults.stations_enabled,
        };

        let flex_enabled = match lookup("WATCH_FLEX") {
            Some(value) => parse_flag("WATCH_FLEX", &value)?,
            None => defaults.flex_enabled,
        };

        Ok(Self {
            interval,
            stations_enabled,
            flex_enabled,
        })
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, WatchError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(WatchError::ConfigError(format!(
            "Invalid {} '{}': expected true or false",
            name, value
        ))),
    }
}

/// Which check of a pass an outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSource {
    /// Station vehicles
    Stations,
    /// Free-floating vehicles
    FlexCars,
}

impl fmt::Display for CheckSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckSource::Stations => f.write_str("check_stations"),
            CheckSource::FlexCars => f.write_str("check_flex_cars"),
        }
    }
}

/// A failed fetch within a pass
#[derive(Debug)]
pub struct CheckFailure {
    /// Check the failure comes from
    pub source: CheckSource,
    /// Underlying fetch error
    pub error: ApiError,
}

/// Summary of one pass
#[derive(Debug, Default)]
pub struct PassReport {
    /// Station queries fetched, successfully or not
    pub station_queries_checked: usize,
    /// `on_car_available` callbacks dispatched
    pub station_notifications: usize,
    /// Whether `on_flex_car_available` was dispatched
    pub flex_notified: bool,
    /// Fetch failures, in the order they happened
    pub failures: Vec<CheckFailure>,
}

impl PassReport {
    /// Whether every enabled check completed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures attributed to one check
    pub fn failures_for(&self, source: CheckSource) -> impl Iterator<Item = &CheckFailure> {
        self.failures.iter().filter(move |f| f.source == source)
    }
}

/// Custom error type for watch operations
#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    /// reservauto.net could not be reached or answered with something unusable
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl actix_web::ResponseError for WatchError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            WatchError::Api(ApiError::Transport(msg)) => {
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "transport_failure",
                    "message": format!("reservauto.net request failed: {}", msg)
                }))
            }
            WatchError::Api(ApiError::Parse(msg)) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "parse_failure",
                    "message": format!("Unexpected reservauto.net response: {}", msg)
                }))
            }
            WatchError::Api(ApiError::InvalidIdentifier(msg)) | WatchError::ConfigError(msg) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "configuration_error",
                    "message": format!("Configuration error: {}", msg)
                }))
            }
        }
    }
}
