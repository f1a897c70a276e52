use serde::Deserialize;
use tracing::debug;

use crate::ApiError;

/// Station record as emitted by the station availability endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawStation {
    /// Station name
    #[serde(rename = "strNomStation")]
    pub station_name: String,

    /// Distance from the requested position, in km
    #[serde(rename = "Distance")]
    pub distance: f64,

    /// Number of reservations overlapping the requested window
    #[serde(rename = "NbrRes")]
    pub reservation_count: i64,

    /// Station latitude
    #[serde(rename = "Latitude")]
    pub latitude: f64,

    /// Station longitude
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

/// Decoded station availability response, in server order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StationAvailabilityBatch {
    /// Every station returned, reserved or not
    pub stations: Vec<RawStation>,
}

/// Top-level shapes the repaired payload may take
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StationPayload {
    Wrapped { data: Vec<RawStation> },
    List(Vec<RawStation>),
    Single(RawStation),
}

/// Turn the raw station endpoint body into a batch of station records.
///
/// The endpoint wraps its body in parentheses and omits the space after each
/// colon, so the body is unwrapped and re-spaced before being decoded as YAML,
/// which tolerates the unquoted keys. The re-spacing is applied to the whole
/// text, so a station name containing a colon comes back with an extra space.
pub fn normalize(raw: &str) -> Result<StationAvailabilityBatch, ApiError> {
    let mut chars = raw.chars();
    if chars.next().is_none() || chars.next_back().is_none() {
        return Err(ApiError::Parse(format!(
            "Station payload too short to unwrap ({} characters)",
            raw.chars().count()
        )));
    }

    let spaced = chars.as_str().replace(':', ": ");
    if spaced.trim().is_empty() {
        return Err(ApiError::Parse("Station payload is empty".to_string()));
    }

    let payload: StationPayload = serde_yaml::from_str(&spaced)
        .map_err(|e| ApiError::Parse(format!("Failed to decode station payload: {}", e)))?;

    let stations = match payload {
        StationPayload::Wrapped { data } => data,
        StationPayload::List(stations) => stations,
        StationPayload::Single(station) => vec![station],
    };

    debug!("Decoded {} station records", stations.len());

    Ok(StationAvailabilityBatch { stations })
}
