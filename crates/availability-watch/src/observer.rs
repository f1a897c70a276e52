use reservauto::{FlexQuery, FlexVehicle, StationQuery, StationVehicle};

/// Supplies the queries for each pass and receives the availability found.
///
/// Queries are requested again on every pass, so an implementation may move its
/// reservation window forward over time. Callbacks are only invoked with non-empty
/// vehicle lists, and are invoked again on every pass for as long as the vehicles
/// stay available.
#[async_trait::async_trait]
pub trait AvailabilityObserver: Send + Sync {
    /// Station queries to check during this pass
    async fn get_station_queries(&self) -> Vec<StationQuery>;

    /// Flex query to check during this pass
    async fn get_flex_query(&self) -> FlexQuery;

    /// Station vehicles are free for the window of `query`
    async fn on_car_available(&self, query: &StationQuery, vehicles: &[StationVehicle]);

    /// Flex vehicles are available right now
    async fn on_flex_car_available(&self, vehicles: &[FlexVehicle]);
}
