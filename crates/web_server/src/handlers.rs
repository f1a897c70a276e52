use actix_web::{HttpResponse, web};
use availability_watch::{AvailabilityObserver, WatchError};
use reservauto::{ReservautoClient, StationQuery, StationVehicle};
use serde::Serialize;

use crate::env_observer::EnvObserver;

/// Station vehicles found for one query
#[derive(Debug, Serialize)]
pub struct StationAvailability {
    /// Query as sent upstream
    pub query: StationQuery,
    /// Free vehicles, in server order
    pub vehicles: Vec<StationVehicle>,
}

/// Check station availability right away for the configured queries
pub async fn station_availability(
    client: web::Data<ReservautoClient>,
    observer: web::Data<EnvObserver>,
) -> Result<HttpResponse, WatchError> {
    let mut results = Vec::new();

    for query in observer.get_station_queries().await {
        let vehicles = client.fetch_stations(&query).await?;
        results.push(StationAvailability { query, vehicles });
    }

    Ok(HttpResponse::Ok().json(results))
}

/// Check flex availability right away for the configured query
pub async fn flex_availability(
    client: web::Data<ReservautoClient>,
    observer: web::Data<EnvObserver>,
) -> Result<HttpResponse, WatchError> {
    let query = observer.get_flex_query().await;
    let vehicles = client.fetch_flex(&query).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "query": query,
        "vehicles": vehicles,
    })))
}

/// Liveness probe
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}
