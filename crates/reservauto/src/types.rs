use std::borrow::Cow;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::ApiError;

/// Format used by reservauto.net for reservation window dates (`DD/MM/YYYY HH:MM`)
pub const RESERVATION_DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// City code understood by reservauto.net.
///
/// The set of cities is open-ended upstream, so any non-blank code is accepted.
/// The known codes are exposed as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CityId(Cow<'static, str>);

impl CityId {
    /// Montréal
    pub const MONTREAL: CityId = CityId(Cow::Borrowed("59"));
    /// Québec
    pub const QUEBEC: CityId = CityId(Cow::Borrowed("90"));
    /// Sherbrooke
    pub const SHERBROOKE: CityId = CityId(Cow::Borrowed("89"));

    /// Create a city id from a raw code
    pub fn new(code: impl Into<String>) -> Result<Self, ApiError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(ApiError::InvalidIdentifier(
                "city id must not be blank".to_string(),
            ));
        }
        Ok(Self(Cow::Owned(code)))
    }

    /// The raw code sent upstream
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Branch code understood by the flex endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BranchId(Cow<'static, str>);

impl BranchId {
    /// Communauto
    pub const COMMUNAUTO: BranchId = BranchId(Cow::Borrowed("1"));

    /// Create a branch id from a raw code
    pub fn new(code: impl Into<String>) -> Result<Self, ApiError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(ApiError::InvalidIdentifier(
                "branch id must not be blank".to_string(),
            ));
        }
        Ok(Self(Cow::Owned(code)))
    }

    /// The raw code sent upstream
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Query for station vehicles free during a reservation window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationQuery {
    /// Latitude the search is centered on
    pub from_latitude: String,
    /// Longitude the search is centered on
    pub from_longitude: String,
    /// City to search in
    pub city_id: CityId,
    /// Distance the observer is interested in. Not sent upstream.
    pub max_distance: f64,
    /// Start of the reservation window
    pub start_date: NaiveDateTime,
    /// End of the reservation window
    pub end_date: NaiveDateTime,
}

/// Query for free-floating vehicles
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlexQuery {
    /// Provider branch
    pub branch_id: BranchId,
    /// Language of the response
    pub language_id: String,
    /// City to search in
    pub city_id: CityId,
}

/// A station vehicle with no reservation during the requested window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationVehicle {
    /// Distance from the query position, as computed upstream
    pub distance: f64,
    /// Station latitude
    pub latitude: f64,
    /// Station longitude
    pub longitude: f64,
    /// Station name
    pub location_name: String,
}

/// A free-floating vehicle currently available
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlexVehicle {
    /// Current latitude
    pub latitude: f64,
    /// Current longitude
    pub longitude: f64,
    /// Whether the vehicle is offered at a promotional rate
    pub is_promo: bool,
    /// Car brand
    pub brand: String,
    /// Car model
    pub model: String,
    /// Fleet number
    pub vehicle_number: i64,
    /// License plate
    pub plate: String,
}

/// Format a date the way the station endpoint expects it
pub fn format_reservation_date(date: &NaiveDateTime) -> String {
    date.format(RESERVATION_DATE_FORMAT).to_string()
}

/// Parse a `DD/MM/YYYY HH:MM` date
pub fn parse_reservation_date(value: &str) -> Result<NaiveDateTime, ApiError> {
    NaiveDateTime::parse_from_str(value.trim(), RESERVATION_DATE_FORMAT)
        .map_err(|e| ApiError::Parse(format!("Invalid reservation date '{}': {}", value, e)))
}
