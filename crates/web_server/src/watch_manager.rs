use std::sync::Arc;

use availability_watch::{
    AvailabilityObserver, AvailabilitySource, AvailabilityWatcher, WatcherConfig,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Manager for the availability watcher
/// Runs the polling loop in the background next to the web server
pub struct WatchManager {
    source: Arc<dyn AvailabilitySource>,
    observer: Arc<dyn AvailabilityObserver>,
    config: WatcherConfig,
    shutdown_tx: Option<mpsc::Sender<()>>,
    watcher_handle: Option<JoinHandle<()>>,
}

impl WatchManager {
    /// Create a new watch manager
    pub fn new(
        source: Arc<dyn AvailabilitySource>,
        observer: Arc<dyn AvailabilityObserver>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            source,
            observer,
            config,
            shutdown_tx: None,
            watcher_handle: None,
        }
    }

    /// Start the polling loop, unless it is already running
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Availability watcher already running");
            return;
        }

        info!("Starting availability watcher");

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let watcher = AvailabilityWatcher::new(
            self.source.clone(),
            self.observer.clone(),
            Some(self.config.clone()),
        );

        let handle = tokio::spawn(async move {
            if let Err(e) = watcher.start(shutdown_rx).await {
                error!("Availability watcher failed: {}", e);
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.watcher_handle = Some(handle);
    }

    /// Stop the polling loop, letting a pass in progress finish
    pub async fn stop(&mut self) {
        info!("Stopping availability watcher");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            // The loop may already be gone, in which case there is nobody to tell
            let _ = shutdown_tx.send(()).await;
        }

        if let Some(handle) = self.watcher_handle.take() {
            if let Err(e) = handle.await {
                error!("Availability watcher task failed: {}", e);
            }
        }

        info!("Availability watcher stopped");
    }

    /// Whether the polling loop is running
    pub fn is_running(&self) -> bool {
        self.watcher_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for WatchManager {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher_handle.take() {
            handle.abort();
        }
    }
}
