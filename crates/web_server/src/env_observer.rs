use availability_watch::{AvailabilityObserver, WatchError};
use chrono::{DurationRound, Local, NaiveDateTime, TimeDelta};
use reservauto::{
    BranchId, CityId, FlexQuery, FlexVehicle, StationQuery, StationVehicle,
    format_reservation_date, parse_reservation_date,
};

/// Reservation window the station queries ask about
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationWindow {
    /// Always the same window
    Fixed {
        /// First reserved minute
        start: NaiveDateTime,
        /// End of the reservation
        end: NaiveDateTime,
    },
    /// Starts at the next half hour and lasts `length`, recomputed on every pass
    Rolling { length: TimeDelta },
}

impl ReservationWindow {
    /// Concrete start and end of the window, relative to `now` for rolling windows
    pub fn resolve(&self, now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        match self {
            ReservationWindow::Fixed { start, end } => (*start, *end),
            ReservationWindow::Rolling { length } => {
                let start = now
                    .duration_trunc(TimeDelta::minutes(30))
                    .unwrap_or(now)
                    + TimeDelta::minutes(30);
                (start, start + *length)
            }
        }
    }
}

/// Observer configured from `COMMUNAUTO_*` environment variables that logs what it finds
#[derive(Debug, Clone)]
pub struct EnvObserver {
    city_id: CityId,
    latitude: String,
    longitude: String,
    max_distance: f64,
    window: ReservationWindow,
    branch_id: BranchId,
    language_id: String,
}

impl EnvObserver {
    /// Build the observer from the process environment
    pub fn from_env() -> Result<Self, WatchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the observer from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let city_id = match lookup("COMMUNAUTO_CITY_ID") {
            Some(code) => CityId::new(code).map_err(|e| WatchError::ConfigError(e.to_string()))?,
            None => CityId::QUEBEC,
        };

        let branch_id = match lookup("COMMUNAUTO_BRANCH_ID") {
            Some(code) => BranchId::new(code).map_err(|e| WatchError::ConfigError(e.to_string()))?,
            None => BranchId::COMMUNAUTO,
        };

        let max_distance = match lookup("COMMUNAUTO_MAX_DISTANCE") {
            Some(value) => value.trim().parse::<f64>().map_err(|e| {
                WatchError::ConfigError(format!("Invalid COMMUNAUTO_MAX_DISTANCE '{}': {}", value, e))
            })?,
            None => 2.0,
        };

        let window = match (lookup("COMMUNAUTO_START_DATE"), lookup("COMMUNAUTO_END_DATE")) {
            (Some(start), Some(end)) => {
                let start = parse_reservation_date(&start)
                    .map_err(|e| WatchError::ConfigError(e.to_string()))?;
                let end = parse_reservation_date(&end)
                    .map_err(|e| WatchError::ConfigError(e.to_string()))?;
                if end <= start {
                    return Err(WatchError::ConfigError(
                        "COMMUNAUTO_END_DATE must be after COMMUNAUTO_START_DATE".to_string(),
                    ));
                }
                ReservationWindow::Fixed { start, end }
            }
            (None, None) => {
                let minutes = match lookup("COMMUNAUTO_WINDOW_MINUTES") {
                    Some(value) => value.trim().parse::<i64>().ok().filter(|m| *m > 0).ok_or_else(
                        || {
                            WatchError::ConfigError(format!(
                                "Invalid COMMUNAUTO_WINDOW_MINUTES '{}'",
                                value
                            ))
                        },
                    )?,
                    None => 30,
                };
                ReservationWindow::Rolling {
                    length: TimeDelta::minutes(minutes),
                }
            }
            _ => {
                return Err(WatchError::ConfigError(
                    "COMMUNAUTO_START_DATE and COMMUNAUTO_END_DATE must be set together".to_string(),
                ));
            }
        };

        Ok(Self {
            city_id,
            latitude: lookup("COMMUNAUTO_LATITUDE").unwrap_or_else(|| "46.8046335".to_string()),
            longitude: lookup("COMMUNAUTO_LONGITUDE").unwrap_or_else(|| "-71.2342692".to_string()),
            max_distance,
            window,
            branch_id,
            language_id: lookup("COMMUNAUTO_LANGUAGE_ID").unwrap_or_else(|| "2".to_string()),
        })
    }

    /// Station query for a given instant
    pub fn station_query_at(&self, now: NaiveDateTime) -> StationQuery {
        let (start_date, end_date) = self.window.resolve(now);

        StationQuery {
            from_latitude: self.latitude.clone(),
            from_longitude: self.longitude.clone(),
            city_id: self.city_id.clone(),
            max_distance: self.max_distance,
            start_date,
            end_date,
        }
    }

    /// Flex query for the configured city and branch
    pub fn flex_query(&self) -> FlexQuery {
        FlexQuery {
            branch_id: self.branch_id.clone(),
            language_id: self.language_id.clone(),
            city_id: self.city_id.clone(),
        }
    }
}

#[async_trait::async_trait]
impl AvailabilityObserver for EnvObserver {
    async fn get_station_queries(&self) -> Vec<StationQuery> {
        vec![self.station_query_at(Local::now().naive_local())]
    }

    async fn get_flex_query(&self) -> FlexQuery {
        self.flex_query()
    }

    async fn on_car_available(&self, query: &StationQuery, vehicles: &[StationVehicle]) {
        let nearby: Vec<&StationVehicle> = vehicles
            .iter()
            .filter(|v| v.distance <= query.max_distance)
            .collect();

        log::info!(
            "🚗 {} station cars free from {} to {} ({} within {} km)",
            vehicles.len(),
            format_reservation_date(&query.start_date),
            format_reservation_date(&query.end_date),
            nearby.len(),
            query.max_distance
        );

        for vehicle in nearby {
            log::info!(
                "  📍 {} ({:.2} km) at {}, {}",
                vehicle.location_name,
                vehicle.distance,
                vehicle.latitude,
                vehicle.longitude
            );
        }
    }

    async fn on_flex_car_available(&self, vehicles: &[FlexVehicle]) {
        log::info!("🚙 {} flex cars available", vehicles.len());

        for vehicle in vehicles {
            log::info!(
                "  📍 #{} {} {} [{}]{} at {}, {}",
                vehicle.vehicle_number,
                vehicle.brand,
                vehicle.model,
                vehicle.plate,
                if vehicle.is_promo { " (promo)" } else { "" },
                vehicle.latitude,
                vehicle.longitude
            );
        }
    }
}
