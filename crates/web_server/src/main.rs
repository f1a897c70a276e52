//! Main entry point for the Communauto availability watcher.
//! Polls reservauto.net in the background and exposes on-demand checks over HTTP.

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use availability_watch::WatcherConfig;
use reservauto::ReservautoClient;

mod env_observer;
mod handlers;
mod watch_manager;

use env_observer::EnvObserver;
use handlers::*;
use watch_manager::WatchManager;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting Communauto watcher...");

    let watcher_config = match WatcherConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ Invalid watcher configuration: {}", e);
            std::process::exit(1);
        }
    };

    let observer = match EnvObserver::from_env() {
        Ok(observer) => Arc::new(observer),
        Err(e) => {
            log::error!("❌ Invalid search configuration: {}", e);
            std::process::exit(1);
        }
    };

    let client = match ReservautoClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("❌ Failed to create reservauto.net client: {}", e);
            std::process::exit(1);
        }
    };

    log::info!(
        "⏱️ Polling every {:?} (stations: {}, flex: {})",
        watcher_config.interval,
        watcher_config.stations_enabled,
        watcher_config.flex_enabled
    );

    let mut watch_manager = WatchManager::new(client.clone(), observer.clone(), watcher_config);
    watch_manager.start();

    let bind_address = std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    log::info!("🌐 Server will be available at: http://{}", bind_address);

    let client_data = web::Data::from(client);
    let observer_data = web::Data::from(observer);

    let server_result = HttpServer::new(move || {
        App::new()
            .app_data(client_data.clone())
            .app_data(observer_data.clone())
            .wrap(Logger::default())
            .service(
                web::scope("/api")
                    .route("/stations", web::get().to(station_availability))
                    .route("/flex", web::get().to(flex_availability)),
            )
            .route("/health", web::get().to(health))
    })
    .bind(&bind_address)?
    .run()
    .await;

    watch_manager.stop().await;

    log::info!("👋 Communauto watcher stopped");
    server_result
}
