//! # Daemon Mode
//!
//! Long-running process that owns the pipeline: registers the D-Bus service,
//! runs the interval timer and applies a new photo each time it fires. Runs
//! until interrupted.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline::{Outcome, Pipeline};
use crate::service::{self, ServiceState, WallpaperService, OBJECT_PATH, SERVICE_NAME};
use crate::timer::IntervalTimer;
use crate::wallpaper::{default_cache_path, PlatformBackend};

pub async fn run() -> Result<(), String> {
    let config = Config::load();
    if let Err(e) = config.validate() {
        warn!("Configuration incomplete ({e}); automatic changes will be skipped until it is fixed");
    }

    // --- Timer ---
    let timer = Arc::new(IntervalTimer::new(config.auto_change_enabled, config.interval()));
    let mut timer_rx = timer.start();

    // --- Shared state ---
    let pipeline = Arc::new(Pipeline::new(PlatformBackend::default(), default_cache_path()));
    let state = Arc::new(RwLock::new(ServiceState::new(config)));

    // --- D-Bus service ---
    // The daemon keeps working without the bus; only remote control is lost.
    let service = WallpaperService::new(state.clone(), pipeline.clone(), timer.clone());
    let connection = match zbus::connection::Builder::session()
        .and_then(|b| b.name(SERVICE_NAME))
        .and_then(|b| b.serve_at(OBJECT_PATH, service))
    {
        Ok(builder) => match builder.build().await {
            Ok(conn) => {
                info!("D-Bus service running at {OBJECT_PATH} on {SERVICE_NAME}");
                Some(conn)
            }
            Err(e) => {
                warn!("Failed to build D-Bus connection: {e}");
                None
            }
        },
        Err(e) => {
            warn!("Failed to configure D-Bus: {e}");
            None
        }
    };

    // --- Timer events ---
    let timer_task = {
        let state = state.clone();
        let pipeline = pipeline.clone();
        let connection = connection.clone();
        tokio::spawn(async move {
            while let Some(()) = timer_rx.recv().await {
                info!("Timer fired, changing wallpaper");
                match service::run_timed_change(&state, &pipeline, connection.as_ref()).await {
                    Ok(Outcome::Applied(_)) => {}
                    Ok(Outcome::Skipped(reason)) => info!("Automatic change skipped: {reason}"),
                    Err(e) => warn!("Automatic change failed: {e}"),
                }
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {e}"))?;

    info!("Shutting down");
    timer.stop();
    timer_task.abort();
    Ok(())
}
