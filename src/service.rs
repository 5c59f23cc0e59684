//! # Wallpaper Service Module
//!
//! Exposes the pipeline as a D-Bus service owned by the daemon process.
//!
//! ## D-Bus Interface
//!
//! Service name: `io.github.photowall.Wallpaper1`
//! Object path: `/io/github/photowall/Wallpaper1`
//!
//! ### Methods
//! - `RefreshWallpaper()` - Pick a random photo and apply it
//! - `FetchGallery(count: u32)` - Random photos with thumbnail bytes
//! - `ApplyPhoto(id: String, position: String)` - Apply a chosen photo
//! - `PrepareEditorSource(id: String)` - Download a chosen photo, return the cache path
//! - `GetConfig()` / `ReloadConfig()` - Configuration snapshot as JSON / re-read from disk
//! - `GetStatus()` - Busy flag, pipeline stage and last status message
//! - `GetTimerEnabled()` / `SetTimerEnabled(enabled: bool)` / `GetTimerNextRun()`
//! - `ListAlbums()` / `ListPeople()` - `(id, name)` pairs for filling in the configuration
//!
//! ### Signals
//! - `WallpaperChanged(path: String, status: String)` - Emitted when the wallpaper changes
//! - `TimerStateChanged(enabled: bool)` - Emitted when the timer is toggled
//! - `FetchProgress(state: String, message: String)` - Emitted during refreshes

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use zbus::{interface, SignalContext};

use crate::config::Config;
use crate::discovery::{self, NamedItem};
use crate::error::PipelineError;
use crate::pipeline::{Outcome, Pipeline, Trigger};
use crate::timer::IntervalTimer;
use crate::wallpaper::{PlatformBackend, Position};

/// D-Bus service name, unique on the session bus.
pub const SERVICE_NAME: &str = "io.github.photowall.Wallpaper1";

/// D-Bus object path of the interface.
pub const OBJECT_PATH: &str = "/io/github/photowall/Wallpaper1";

/// State shared between the D-Bus interface and the timer task.
pub struct ServiceState {
    /// Snapshot source for every operation; replaced by `ReloadConfig`
    pub config: Config,
    /// Status of the last successful change
    pub last_status: Option<String>,
}

impl ServiceState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            last_status: None,
        }
    }
}

pub struct WallpaperService {
    state: Arc<RwLock<ServiceState>>,
    pipeline: Arc<Pipeline<PlatformBackend>>,
    timer: Arc<IntervalTimer>,
}

impl WallpaperService {
    pub fn new(
        state: Arc<RwLock<ServiceState>>,
        pipeline: Arc<Pipeline<PlatformBackend>>,
        timer: Arc<IntervalTimer>,
    ) -> Self {
        Self { state, pipeline, timer }
    }

    async fn snapshot(&self) -> Config {
        self.state.read().await.config.clone()
    }

    async fn record(&self, outcome: &Outcome) {
        if let Outcome::Applied(status) = outcome {
            self.state.write().await.last_status = Some(status.clone());
        }
    }
}

/// Writes the timer flag into the file as it is on disk now, then adopts that
/// file as the snapshot. Edits made since the last reload survive; a file that
/// does not parse is left alone.
fn persist_timer_enabled(state: &mut ServiceState, enabled: bool) -> Result<(), String> {
    let mut config = Config::read()?;
    config.auto_change_enabled = enabled;
    let saved = config.save();
    state.config = config;
    saved
}

fn pairs(items: Vec<NamedItem>) -> Vec<(String, String)> {
    items.into_iter().map(|i| (i.id, i.name)).collect()
}

fn parse_position(position: &str, fallback: Position) -> zbus::fdo::Result<Position> {
    if position.trim().is_empty() {
        return Ok(fallback);
    }
    position.parse().map_err(zbus::fdo::Error::InvalidArgs)
}

#[interface(name = "io.github.photowall.Wallpaper1")]
impl WallpaperService {
    /// Pick a random photo from the configured source and apply it
    async fn refresh_wallpaper(&self, #[zbus(signal_context)] ctx: SignalContext<'_>) -> zbus::fdo::Result<String> {
        Self::fetch_progress(&ctx, "starting", "Looking for photos...").await?;

        let config = self.snapshot().await;
        match self.pipeline.auto_apply(&config, Trigger::Interactive).await {
            Ok(outcome) => {
                self.record(&outcome).await;
                if let Outcome::Applied(status) = &outcome {
                    let path = self.pipeline.cache_path().to_string_lossy().to_string();
                    Self::wallpaper_changed(&ctx, &path, status).await?;
                }
                Self::fetch_progress(&ctx, "complete", outcome.message()).await?;
                Ok(outcome.message().to_string())
            }
            Err(e) => {
                Self::fetch_progress(&ctx, "error", &e.to_string()).await?;
                Err(e.into())
            }
        }
    }

    /// Random photos for browsing; local photos come with empty bytes and their path as id
    async fn fetch_gallery(&self, count: u32) -> zbus::fdo::Result<Vec<(String, Vec<u8>)>> {
        let config = self.snapshot().await;
        let items = self.pipeline.fetch_gallery(&config, count as usize).await?;
        Ok(items
            .into_iter()
            .map(|item| (item.id, item.thumbnail.unwrap_or_default()))
            .collect())
    }

    /// Apply the photo with the given id; an empty position uses the configured one
    async fn apply_photo(
        &self,
        id: String,
        position: String,
        #[zbus(signal_context)] ctx: SignalContext<'_>,
    ) -> zbus::fdo::Result<String> {
        let config = self.snapshot().await;
        let position = parse_position(&position, config.position)?;

        let outcome = self.pipeline.apply_selected(&config, &id, position).await?;
        self.record(&outcome).await;

        if let Outcome::Applied(status) = &outcome {
            let path = self.pipeline.cache_path().to_string_lossy().to_string();
            Self::wallpaper_changed(&ctx, &path, status).await?;
        }
        Ok(outcome.message().to_string())
    }

    /// Download the photo with the given id into the cache file and return its path
    async fn prepare_editor_source(&self, id: String) -> zbus::fdo::Result<String> {
        let config = self.snapshot().await;
        let path = self.pipeline.prepare_editor_source(&config, &id).await?;
        Ok(path.to_string_lossy().to_string())
    }

    /// Get current configuration as JSON
    async fn get_config(&self) -> zbus::fdo::Result<String> {
        let state = self.state.read().await;
        serde_json::to_string(&state.config).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Re-read the configuration file
    async fn reload_config(&self) {
        let config = Config::load();
        self.timer.set_enabled(config.auto_change_enabled);
        self.timer.set_interval(config.interval()).await;
        self.state.write().await.config = config;
        info!("Configuration reloaded");
    }

    async fn get_timer_enabled(&self) -> bool {
        self.timer.is_enabled()
    }

    /// Enable or disable the timer and persist the choice
    async fn set_timer_enabled(
        &self,
        enabled: bool,
        #[zbus(signal_context)] ctx: SignalContext<'_>,
    ) -> zbus::fdo::Result<()> {
        self.timer.set_enabled(enabled);
        if let Err(e) = persist_timer_enabled(&mut *self.state.write().await, enabled) {
            warn!("Could not persist timer state: {e}");
        }

        Self::timer_state_changed(&ctx, enabled).await?;
        Ok(())
    }

    /// Whether a change is running, its stage, and the status of the last successful change
    async fn get_status(&self) -> (bool, String, String) {
        let last = self.state.read().await.last_status.clone().unwrap_or_default();
        (self.pipeline.is_busy(), self.pipeline.stage().to_string(), last)
    }

    /// Next scheduled change (empty string if the timer is disabled)
    async fn get_timer_next_run(&self) -> String {
        self.timer.next_run_string().await
    }

    async fn list_albums(&self) -> zbus::fdo::Result<Vec<(String, String)>> {
        let config = self.snapshot().await;
        Ok(pairs(discovery::list_albums(&config).await?))
    }

    async fn list_people(&self) -> zbus::fdo::Result<Vec<(String, String)>> {
        let config = self.snapshot().await;
        Ok(pairs(discovery::list_people(&config).await?))
    }

    // === Signals ===

    #[zbus(signal)]
    async fn wallpaper_changed(ctx: &SignalContext<'_>, path: &str, status: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn timer_state_changed(ctx: &SignalContext<'_>, enabled: bool) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn fetch_progress(ctx: &SignalContext<'_>, state: &str, message: &str) -> zbus::Result<()>;
}

/// Runs one timer-triggered change and announces it when the bus is available.
pub async fn run_timed_change(
    state: &RwLock<ServiceState>,
    pipeline: &Pipeline<PlatformBackend>,
    connection: Option<&zbus::Connection>,
) -> Result<Outcome, PipelineError> {
    let config = state.read().await.config.clone();
    let outcome = pipeline.auto_apply(&config, Trigger::Automatic).await?;

    if let Outcome::Applied(status) = &outcome {
        state.write().await.last_status = Some(status.clone());

        if let Some(connection) = connection {
            let path = pipeline.cache_path().to_string_lossy().to_string();
            match connection
                .object_server()
                .interface::<_, WallpaperService>(OBJECT_PATH)
                .await
            {
                Ok(iface) => {
                    if let Err(e) = WallpaperService::wallpaper_changed(iface.signal_context(), &path, status).await {
                        warn!("Failed to emit WallpaperChanged: {e}");
                    }
                }
                Err(e) => warn!("Service interface not registered: {e}"),
            }
        }
    }

    Ok(outcome)
}
