use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::normalizer::{StationAvailabilityBatch, normalize};
use crate::types::*;
use crate::ApiError;

/// Station availability endpoint (form POST, non-conformant body)
pub const STATION_AVAILABILITY_URL: &str =
    "https://www.reservauto.net/Scripts/Client/Ajax/PublicCall/Get_Car_DisponibilityJSON.asp";

/// Flex vehicle endpoint (GET, JSON body)
pub const FLEX_AVAILABILITY_URL: &str =
    "https://www.reservauto.net/WCF/LSI/LSIBookingServiceV3.svc/GetAvailableVehicles";

/// Client for the reservauto.net availability endpoints
pub struct ReservautoClient {
    client: Client,
    station_url: String,
    flex_url: String,
}

/// Response structure from the flex endpoint
#[derive(Debug, Deserialize)]
pub struct FlexAvailabilityResponse {
    /// Payload wrapper, always named `d` by the service
    #[serde(rename = "d")]
    pub data: FlexVehiclesData,
}

/// Wrapper object holding the flex vehicles
#[derive(Debug, Deserialize)]
pub struct FlexVehiclesData {
    /// Available vehicles; a null or missing list means none
    #[serde(rename = "Vehicles", default, deserialize_with = "null_as_default")]
    pub vehicles: Vec<RawFlexVehicle>,
}

/// Individual vehicle from the flex endpoint
///
/// Text and flag fields sent as null or left out fall back to their empty value.
#[derive(Debug, Deserialize)]
pub struct RawFlexVehicle {
    /// Promotional pricing flag
    #[serde(rename = "isPromo", default, deserialize_with = "null_as_default")]
    pub is_promo: bool,

    /// Manufacturer
    #[serde(rename = "CarBrand", default, deserialize_with = "null_as_default")]
    pub car_brand: String,

    /// Model name
    #[serde(rename = "CarModel", default, deserialize_with = "null_as_default")]
    pub car_model: String,

    /// Fleet number
    #[serde(rename = "CarNo")]
    pub car_no: i64,

    /// License plate
    #[serde(rename = "CarPlate", default, deserialize_with = "null_as_default")]
    pub car_plate: String,

    /// Current latitude
    #[serde(rename = "Latitude")]
    pub latitude: f64,

    /// Current longitude
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ReservautoClient {
    /// Create a client pointing at the production endpoints
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(
            client,
            STATION_AVAILABILITY_URL,
            FLEX_AVAILABILITY_URL,
        ))
    }

    /// Create a client from an existing HTTP client and custom endpoint URLs
    pub fn with_client(
        client: Client,
        station_url: impl Into<String>,
        flex_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            station_url: station_url.into(),
            flex_url: flex_url.into(),
        }
    }

    /// Get the station vehicles without any reservation during the query window
    pub async fn fetch_stations(&self, query: &StationQuery) -> Result<Vec<StationVehicle>, ApiError> {
        debug!(
            "Fetching station availability in city {} from {} to {}",
            query.city_id, query.start_date, query.end_date
        );

        let form = [
            ("CurrentLanguageID", "1".to_string()),
            ("CityID", query.city_id.to_string()),
            ("StartDate", format_reservation_date(&query.start_date)),
            ("EndDate", format_reservation_date(&query.end_date)),
            ("Accessories", "0".to_string()),
            ("FeeType", "80".to_string()),
            ("Latitude", query.from_latitude.clone()),
            ("Longitude", query.from_longitude.clone()),
        ];

        let response = self
            .client
            .post(&self.station_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("Station request failed: {}", e)))?;

        // Decoded with the charset the server declares, not always UTF-8
        let text = Self::check_status(response)
            .await?
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("Failed to read response body: {}", e)))?;
        let batch = normalize(&text)?;

        Ok(available_station_vehicles(batch))
    }

    /// Get every free-floating vehicle currently available
    pub async fn fetch_flex(&self, query: &FlexQuery) -> Result<Vec<FlexVehicle>, ApiError> {
        debug!(
            "Fetching flex vehicles in city {} for branch {}",
            query.city_id, query.branch_id
        );

        let params = [
            ("BranchID", query.branch_id.as_str()),
            ("LanguageID", query.language_id.as_str()),
            ("CityID", query.city_id.as_str()),
        ];

        let response = self
            .client
            .get(&self.flex_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("Flex request failed: {}", e)))?;

        let body = Self::check_status(response)
            .await?
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(format!("Failed to read response body: {}", e)))?;

        let flex_response: FlexAvailabilityResponse = serde_json::from_slice(&body)
            .map_err(|e| ApiError::Parse(format!("Failed to parse flex response: {}", e)))?;

        Ok(flex_vehicles(flex_response))
    }

    /// Pass successful responses through, turning any other status into a transport failure
    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            warn!("Request failed with status {}: {}", status, body);
            return Err(ApiError::Transport(format!("HTTP {} - {}", status, body)));
        }

        Ok(response)
    }
}

/// Keep the stations with no reservation, in server order
pub fn available_station_vehicles(batch: StationAvailabilityBatch) -> Vec<StationVehicle> {
    batch
        .stations
        .into_iter()
        .filter(|station| station.reservation_count == 0)
        .map(|station| StationVehicle {
            distance: station.distance,
            latitude: station.latitude,
            longitude: station.longitude,
            location_name: station.station_name,
        })
        .collect()
}

/// Convert every vehicle of a flex response to our internal format
pub fn flex_vehicles(response: FlexAvailabilityResponse) -> Vec<FlexVehicle> {
    response
        .data
        .vehicles
        .into_iter()
        .map(|vehicle| FlexVehicle {
            latitude: vehicle.latitude,
            longitude: vehicle.longitude,
            is_promo: vehicle.is_promo,
            brand: vehicle.car_brand,
            model: vehicle.car_model,
            vehicle_number: vehicle.car_no,
            plate: vehicle.car_plate,
        })
        .collect()
}
