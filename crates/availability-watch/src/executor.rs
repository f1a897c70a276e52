use std::sync::Arc;

use reservauto::{
    ApiError, FlexQuery, FlexVehicle, ReservautoClient, StationQuery, StationVehicle,
};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::observer::AvailabilityObserver;
use crate::watch_types::*;

/// Trait for availability sources (reservauto.net in production)
#[async_trait::async_trait]
pub trait AvailabilitySource: Send + Sync {
    /// Station vehicles free during the query window
    async fn fetch_stations(&self, query: &StationQuery) -> Result<Vec<StationVehicle>, ApiError>;

    /// Flex vehicles currently available
    async fn fetch_flex(&self, query: &FlexQuery) -> Result<Vec<FlexVehicle>, ApiError>;
}

#[async_trait::async_trait]
impl AvailabilitySource for ReservautoClient {
    async fn fetch_stations(&self, query: &StationQuery) -> Result<Vec<StationVehicle>, ApiError> {
        ReservautoClient::fetch_stations(self, query).await
    }

    async fn fetch_flex(&self, query: &FlexQuery) -> Result<Vec<FlexVehicle>, ApiError> {
        ReservautoClient::fetch_flex(self, query).await
    }
}

/// Polling loop checking availability and notifying the observer
pub struct AvailabilityWatcher {
    source: Arc<dyn AvailabilitySource>,
    observer: Arc<dyn AvailabilityObserver>,
    config: WatcherConfig,
}

impl AvailabilityWatcher {
    /// Create a watcher, using the default configuration when none is given
    pub fn new(
        source: Arc<dyn AvailabilitySource>,
        observer: Arc<dyn AvailabilityObserver>,
        config: Option<WatcherConfig>,
    ) -> Self {
        Self {
            source,
            observer,
            config: config.unwrap_or_default(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Run passes until a shutdown signal is received or every sender is dropped.
    ///
    /// The first pass runs immediately. A pass is never interrupted: the signal is
    /// only observed between passes, where it also cuts the wait for the next tick
    /// short. A pass running longer than the interval delays the next one instead
    /// of overlapping it.
    pub async fn start(&self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<(), WatchError> {
        if self.config.interval.is_zero() {
            return Err(WatchError::ConfigError(
                "polling interval must be greater than zero".to_string(),
            ));
        }

        info!(
            "Starting availability watcher (interval: {:?}, stations: {}, flex: {})",
            self.config.interval, self.config.stations_enabled, self.config.flex_enabled
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Availability watcher received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    let report = self.run_pass().await;
                    debug!(
                        "Pass finished: {} station queries, {} station notifications, flex notified: {}, {} failures",
                        report.station_queries_checked,
                        report.station_notifications,
                        report.flex_notified,
                        report.failures.len()
                    );
                }
            }
        }

        info!("Availability watcher stopped");
        Ok(())
    }

    /// Run the enabled checks once, stations first.
    ///
    /// Failures are logged with the check they come from and collected in the
    /// report; a failing check never prevents the other one from running.
    pub async fn run_pass(&self) -> PassReport {
        let mut report = PassReport::default();

        if self.config.stations_enabled {
            self.check_stations(&mut report).await;
        }

        if self.config.flex_enabled {
            self.check_flex_cars(&mut report).await;
        }

        for failure in &report.failures {
            error!("[{}] Error: {}", failure.source, failure.error);
        }

        report
    }

    async fn check_stations(&self, report: &mut PassReport) {
        let queries = self.observer.get_station_queries().await;

        for query in queries {
            report.station_queries_checked += 1;

            let vehicles = match self.source.fetch_stations(&query).await {
                Ok(vehicles) => vehicles,
                Err(e) => {
                    report.failures.push(CheckFailure {
                        source: CheckSource::Stations,
                        error: e,
                    });
                    continue;
                }
            };

            if vehicles.is_empty() {
                debug!(
                    "No station vehicle available in city {} from {} to {}",
                    query.city_id, query.start_date, query.end_date
                );
                continue;
            }

            info!(
                "Found {} available station vehicles in city {}",
                vehicles.len(),
                query.city_id
            );
            self.observer.on_car_available(&query, &vehicles).await;
            report.station_notifications += 1;
        }
    }

    async fn check_flex_cars(&self, report: &mut PassReport) {
        let query = self.observer.get_flex_query().await;

        match self.source.fetch_flex(&query).await {
            Ok(vehicles) if vehicles.is_empty() => {
                debug!("No flex vehicle available in city {}", query.city_id);
            }
            Ok(vehicles) => {
                info!(
                    "Found {} available flex vehicles in city {}",
                    vehicles.len(),
                    query.city_id
                );
                self.observer.on_flex_car_available(&vehicles).await;
                report.flex_notified = true;
            }
            Err(e) => report.failures.push(CheckFailure {
                source: CheckSource::FlexCars,
                error: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::NaiveDate;
    use reservauto::{BranchId, CityId};
    use tokio::task::JoinHandle;
    use tokio::time::{Instant, sleep};

    const HOUR: Duration = Duration::from_secs(60 * 60);

    #[derive(Clone)]
    enum Outcome<T> {
        Available(Vec<T>),
        TransportFailure,
        ParseFailure,
    }

    impl<T: Clone> Outcome<T> {
        fn to_result(&self) -> Result<Vec<T>, ApiError> {
            match self {
                Outcome::Available(vehicles) => Ok(vehicles.clone()),
                Outcome::TransportFailure => Err(ApiError::Transport("HTTP 503".to_string())),
                Outcome::ParseFailure => Err(ApiError::Parse("bad payload".to_string())),
            }
        }
    }

    /// Source answering from canned outcomes, keyed by query latitude for stations
    struct MockSource {
        stations: HashMap<String, Outcome<StationVehicle>>,
        flex: Outcome<FlexVehicle>,
        delay: Duration,
        station_calls: AtomicUsize,
        flex_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockSource {
        fn new(stations: Vec<(&str, Outcome<StationVehicle>)>, flex: Outcome<FlexVehicle>) -> Self {
            Self {
                stations: stations
                    .into_iter()
                    .map(|(lat, outcome)| (lat.to_string(), outcome))
                    .collect(),
                flex,
                delay: Duration::ZERO,
                station_calls: AtomicUsize::new(0),
                flex_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        async fn simulate_io(&self) {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl AvailabilitySource for MockSource {
        async fn fetch_stations(
            &self,
            query: &StationQuery,
        ) -> Result<Vec<StationVehicle>, ApiError> {
            self.station_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_io().await;
            self.stations
                .get(&query.from_latitude)
                .map(Outcome::to_result)
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn fetch_flex(&self, _query: &FlexQuery) -> Result<Vec<FlexVehicle>, ApiError> {
            self.flex_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_io().await;
            self.flex.to_result()
        }
    }

    struct RecordingObserver {
        queries: Vec<StationQuery>,
        station_query_requests: AtomicUsize,
        flex_query_requests: AtomicUsize,
        station_events: Mutex<Vec<(StationQuery, Vec<StationVehicle>)>>,
        flex_events: Mutex<Vec<Vec<FlexVehicle>>>,
    }

    impl RecordingObserver {
        fn new(latitudes: &[&str]) -> Self {
            Self {
                queries: latitudes.iter().map(|lat| station_query(lat)).collect(),
                station_query_requests: AtomicUsize::new(0),
                flex_query_requests: AtomicUsize::new(0),
                station_events: Mutex::new(Vec::new()),
                flex_events: Mutex::new(Vec::new()),
            }
        }

        fn station_event_count(&self) -> usize {
            self.station_events.lock().unwrap().len()
        }

        fn flex_event_count(&self) -> usize {
            self.flex_events.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl AvailabilityObserver for RecordingObserver {
        async fn get_station_queries(&self) -> Vec<StationQuery> {
            self.station_query_requests.fetch_add(1, Ordering::SeqCst);
            self.queries.clone()
        }

        async fn get_flex_query(&self) -> FlexQuery {
            self.flex_query_requests.fetch_add(1, Ordering::SeqCst);
            FlexQuery {
                branch_id: BranchId::COMMUNAUTO,
                language_id: "2".to_string(),
                city_id: CityId::QUEBEC,
            }
        }

        async fn on_car_available(&self, query: &StationQuery, vehicles: &[StationVehicle]) {
            self.station_events
                .lock()
                .unwrap()
                .push((query.clone(), vehicles.to_vec()));
        }

        async fn on_flex_car_available(&self, vehicles: &[FlexVehicle]) {
            self.flex_events.lock().unwrap().push(vehicles.to_vec());
        }
    }

    fn station_query(latitude: &str) -> StationQuery {
        let day = NaiveDate::from_ymd_opt(2022, 10, 3).unwrap();
        StationQuery {
            from_latitude: latitude.to_string(),
            from_longitude: "-71.2342692".to_string(),
            city_id: CityId::QUEBEC,
            max_distance: 2.0,
            start_date: day.and_hms_opt(11, 0, 0).unwrap(),
            end_date: day.and_hms_opt(11, 30, 0).unwrap(),
        }
    }

    fn station_vehicle(name: &str) -> StationVehicle {
        StationVehicle {
            distance: 0.5,
            latitude: 46.81,
            longitude: -71.21,
            location_name: name.to_string(),
        }
    }

    fn flex_vehicle(number: i64) -> FlexVehicle {
        FlexVehicle {
            latitude: 46.8,
            longitude: -71.2,
            is_promo: false,
            brand: "Toyota".to_string(),
            model: "Prius C".to_string(),
            vehicle_number: number,
            plate: format!("F{}", number),
        }
    }

    fn config(interval: Duration) -> WatcherConfig {
        WatcherConfig {
            interval,
            stations_enabled: true,
            flex_enabled: true,
        }
    }

    fn spawn_watcher(
        source: Arc<MockSource>,
        observer: Arc<RecordingObserver>,
        config: WatcherConfig,
    ) -> (mpsc::Sender<()>, JoinHandle<Result<(), WatchError>>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let watcher = AvailabilityWatcher::new(source, observer, Some(config));
        let handle = tokio::spawn(async move { watcher.start(shutdown_rx).await });
        (shutdown_tx, handle)
    }

    #[tokio::test]
    async fn test_empty_results_do_not_notify() {
        let source = Arc::new(MockSource::new(
            vec![("46.80", Outcome::Available(vec![]))],
            Outcome::Available(vec![]),
        ));
        let observer = Arc::new(RecordingObserver::new(&["46.80"]));
        let watcher = AvailabilityWatcher::new(source.clone(), observer.clone(), None);

        let report = watcher.run_pass().await;

        assert!(report.is_success());
        assert_eq!(source.station_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.flex_calls.load(Ordering::SeqCst), 1);
        assert_eq!(observer.station_event_count(), 0);
        assert_eq!(observer.flex_event_count(), 0);
    }

    #[tokio::test]
    async fn test_one_notification_per_non_empty_query() {
        let source = Arc::new(MockSource::new(
            vec![
                ("46.80", Outcome::Available(vec![station_vehicle("A"), station_vehicle("B")])),
                ("46.81", Outcome::Available(vec![])),
                ("46.82", Outcome::Available(vec![station_vehicle("C")])),
            ],
            Outcome::Available(vec![flex_vehicle(1), flex_vehicle(2), flex_vehicle(3)]),
        ));
        let observer = Arc::new(RecordingObserver::new(&["46.80", "46.81", "46.82"]));
        let watcher = AvailabilityWatcher::new(source.clone(), observer.clone(), None);

        let report = watcher.run_pass().await;

        assert_eq!(report.station_queries_checked, 3);
        assert_eq!(report.station_notifications, 2);
        assert!(report.flex_notified);

        let events = observer.station_events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0.from_latitude, "46.80");
        assert_eq!(events[0].1.len(), 2);
        assert_eq!(events[1].0.from_latitude, "46.82");
        assert_eq!(events[1].1, vec![station_vehicle("C")]);

        let flex_events = observer.flex_events.lock().unwrap();
        assert_eq!(flex_events.len(), 1);
        assert_eq!(flex_events[0].len(), 3);
    }

    #[tokio::test]
    async fn test_disabled_checks_are_skipped() {
        let source = Arc::new(MockSource::new(
            vec![("46.80", Outcome::Available(vec![station_vehicle("A")]))],
            Outcome::Available(vec![flex_vehicle(1)]),
        ));
        let observer = Arc::new(RecordingObserver::new(&["46.80"]));
        let watcher = AvailabilityWatcher::new(
            source.clone(),
            observer.clone(),
            Some(WatcherConfig {
                interval: HOUR,
                stations_enabled: false,
                flex_enabled: true,
            }),
        );

        watcher.run_pass().await;

        assert_eq!(observer.station_query_requests.load(Ordering::SeqCst), 0);
        assert_eq!(source.station_calls.load(Ordering::SeqCst), 0);
        assert_eq!(observer.flex_event_count(), 1);
    }

    #[tokio::test]
    async fn test_flex_failure_does_not_suppress_station_check() {
        let source = Arc::new(MockSource::new(
            vec![("46.80", Outcome::Available(vec![station_vehicle("A")]))],
            Outcome::TransportFailure,
        ));
        let observer = Arc::new(RecordingObserver::new(&["46.80"]));
        let watcher = AvailabilityWatcher::new(source.clone(), observer.clone(), None);

        let report = watcher.run_pass().await;

        assert_eq!(observer.station_event_count(), 1);
        assert_eq!(observer.flex_event_count(), 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, CheckSource::FlexCars);
        assert!(matches!(report.failures[0].error, ApiError::Transport(_)));
    }

    #[tokio::test]
    async fn test_station_failure_does_not_suppress_other_checks() {
        let source = Arc::new(MockSource::new(
            vec![
                ("46.80", Outcome::ParseFailure),
                ("46.81", Outcome::Available(vec![station_vehicle("B")])),
            ],
            Outcome::Available(vec![flex_vehicle(7)]),
        ));
        let observer = Arc::new(RecordingObserver::new(&["46.80", "46.81"]));
        let watcher = AvailabilityWatcher::new(source.clone(), observer.clone(), None);

        let report = watcher.run_pass().await;

        assert_eq!(report.failures_for(CheckSource::Stations).count(), 1);
        assert_eq!(report.failures_for(CheckSource::FlexCars).count(), 0);
        assert!(matches!(report.failures[0].error, ApiError::Parse(_)));
        assert_eq!(observer.station_event_count(), 1);
        assert_eq!(observer.flex_event_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let source = Arc::new(MockSource::new(vec![], Outcome::Available(vec![])));
        let observer = Arc::new(RecordingObserver::new(&[]));
        let (_shutdown_tx, handle) = spawn_watcher(source, observer, config(Duration::ZERO));

        let result = handle.await.unwrap();

        assert!(matches!(result, Err(WatchError::ConfigError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_pass_runs_immediately() {
        let source = Arc::new(MockSource::new(
            vec![("46.80", Outcome::Available(vec![station_vehicle("A")]))],
            Outcome::Available(vec![]),
        ));
        let observer = Arc::new(RecordingObserver::new(&["46.80"]));
        let (shutdown_tx, handle) = spawn_watcher(source, observer.clone(), config(HOUR));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(observer.station_event_count(), 1);

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeats_after_interval_without_deduplication() {
        let source = Arc::new(MockSource::new(
            vec![("46.80", Outcome::Available(vec![station_vehicle("A")]))],
            Outcome::Available(vec![flex_vehicle(1)]),
        ));
        let observer = Arc::new(RecordingObserver::new(&["46.80"]));
        let (shutdown_tx, handle) = spawn_watcher(source, observer.clone(), config(HOUR));

        sleep(HOUR + Duration::from_secs(1)).await;
        assert_eq!(observer.station_event_count(), 2);
        assert_eq!(observer.flex_event_count(), 2);
        assert_eq!(observer.station_query_requests.load(Ordering::SeqCst), 2);

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_continues_after_flex_failure() {
        let source = Arc::new(MockSource::new(
            vec![("46.80", Outcome::Available(vec![station_vehicle("A")]))],
            Outcome::TransportFailure,
        ));
        let observer = Arc::new(RecordingObserver::new(&["46.80"]));
        let (shutdown_tx, handle) =
            spawn_watcher(source.clone(), observer.clone(), config(Duration::from_secs(60)));

        sleep(Duration::from_secs(61)).await;

        assert_eq!(source.flex_calls.load(Ordering::SeqCst), 2);
        assert_eq!(observer.station_event_count(), 2);
        assert_eq!(observer.flex_event_count(), 0);

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_wait_for_next_tick() {
        let source = Arc::new(MockSource::new(
            vec![("46.80", Outcome::Available(vec![station_vehicle("A")]))],
            Outcome::Available(vec![]),
        ));
        let observer = Arc::new(RecordingObserver::new(&["46.80"]));
        let started = Instant::now();
        let (shutdown_tx, handle) = spawn_watcher(source.clone(), observer.clone(), config(HOUR));

        sleep(Duration::from_secs(5)).await;
        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();

        assert!(started.elapsed() < HOUR);
        assert_eq!(observer.station_event_count(), 1);
        assert_eq!(source.station_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_sender_stops_the_loop() {
        let source = Arc::new(MockSource::new(vec![], Outcome::Available(vec![])));
        let observer = Arc::new(RecordingObserver::new(&[]));
        let (shutdown_tx, handle) = spawn_watcher(source, observer, config(HOUR));

        drop(shutdown_tx);

        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_in_flight_finishes_before_shutdown() {
        let source = Arc::new(
            MockSource::new(
                vec![("46.80", Outcome::Available(vec![station_vehicle("A")]))],
                Outcome::Available(vec![flex_vehicle(1)]),
            )
            .with_delay(Duration::from_secs(10)),
        );
        let observer = Arc::new(RecordingObserver::new(&["46.80"]));
        let started = Instant::now();
        let (shutdown_tx, handle) = spawn_watcher(source.clone(), observer.clone(), config(HOUR));

        // Station fetch is still running at this point
        sleep(Duration::from_secs(5)).await;
        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();

        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < HOUR);
        assert_eq!(observer.station_event_count(), 1);
        assert_eq!(observer.flex_event_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_passes_never_overlap() {
        let source = Arc::new(
            MockSource::new(
                vec![("46.80", Outcome::Available(vec![station_vehicle("A")]))],
                Outcome::Available(vec![flex_vehicle(1)]),
            )
            .with_delay(Duration::from_secs(25)),
        );
        let observer = Arc::new(RecordingObserver::new(&["46.80"]));
        let (shutdown_tx, handle) =
            spawn_watcher(source.clone(), observer.clone(), config(Duration::from_secs(10)));

        sleep(Duration::from_secs(200)).await;
        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            source.station_calls.load(Ordering::SeqCst),
            observer.station_event_count()
        );
    }
}
