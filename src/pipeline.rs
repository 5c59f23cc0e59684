//! # Pipeline Orchestrator
//!
//! Runs the end-to-end operations:
//!
//! - [`Pipeline::fetch_gallery`]: random thumbnails for browsing
//! - [`Pipeline::auto_apply`]: pick one photo and make it the wallpaper
//! - [`Pipeline::apply_selected`]: make a chosen photo the wallpaper
//! - [`Pipeline::prepare_editor_source`]: download a chosen photo for editing
//!
//! ## Auto-apply states
//! `Idle → Authenticating → Querying → Selecting → Downloading → Applying → Idle`.
//! Any failure returns to `Idle` with the reason logged.
//!
//! Everything that writes the cache file holds the single-flight guard. A second
//! request arriving while one runs is dropped, never queued.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::config::Config;
use crate::error::PipelineError;
use crate::providers::{self, ImageLocation, PhotoSource, Quality, QueryPurpose};
use crate::wallpaper::{write_cache_file, DesktopBackend, ImageFormat, Position, WallpaperApplier};

/// Who asked for the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Interval timer. Missing credentials are a silent skip.
    Automatic,
    /// A user action. Every failure is reported.
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Authenticating,
    Querying,
    Selecting,
    Downloading,
    Applying,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Authenticating => "authenticating",
            Stage::Querying => "querying",
            Stage::Selecting => "selecting",
            Stage::Downloading => "downloading",
            Stage::Applying => "applying",
        };
        f.write_str(name)
    }
}

/// Result of an operation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The wallpaper changed; the text is shown to the user.
    Applied(String),
    /// Nothing happened, for a reason that is not an error.
    Skipped(String),
}

impl Outcome {
    pub fn message(&self) -> &str {
        match self {
            Outcome::Applied(m) | Outcome::Skipped(m) => m,
        }
    }
}

/// One gallery entry. Local photos carry no bytes; their id is the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryItem {
    pub id: String,
    pub thumbnail: Option<Vec<u8>>,
}

/// Releases the single-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Pipeline<B: DesktopBackend> {
    applier: WallpaperApplier<B>,
    cache_path: PathBuf,
    in_flight: AtomicBool,
    stage: Mutex<Stage>,
}

type OpenResult = Result<Box<dyn PhotoSource>, PipelineError>;

impl<B: DesktopBackend> Pipeline<B> {
    pub fn new(backend: B, cache_path: PathBuf) -> Self {
        Self {
            applier: WallpaperApplier::new(backend),
            cache_path,
            in_flight: AtomicBool::new(false),
            stage: Mutex::new(Stage::Idle),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn stage(&self) -> Stage {
        *self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    fn enter(&self, stage: Stage) {
        info!("Pipeline stage: {stage}");
        *self.stage.lock().unwrap_or_else(|e| e.into_inner()) = stage;
    }

    fn settle<T>(&self, result: Result<T, PipelineError>) -> Result<T, PipelineError> {
        if let Err(e) = &result {
            warn!("Pipeline failed during {}: {e}", self.stage());
        }
        self.enter(Stage::Idle);
        result
    }

    /// Picks a random photo from the configured source and applies it.
    pub async fn auto_apply(&self, config: &Config, trigger: Trigger) -> Result<Outcome, PipelineError> {
        self.auto_apply_with(providers::open_source(config), trigger, config.position)
            .await
    }

    pub(crate) async fn auto_apply_with<F>(
        &self,
        open: F,
        trigger: Trigger,
        position: Position,
    ) -> Result<Outcome, PipelineError>
    where
        F: Future<Output = OpenResult>,
    {
        let Some(_guard) = self.try_begin() else {
            info!("Wallpaper change already running, dropping {trigger:?} trigger");
            return Ok(Outcome::Skipped("Another wallpaper change is in progress".into()));
        };

        self.enter(Stage::Authenticating);
        let source = match open.await {
            Ok(source) => source,
            Err(PipelineError::AuthFailure(reason)) if trigger == Trigger::Automatic => {
                info!("Skipping automatic change: {reason}");
                self.enter(Stage::Idle);
                return Ok(Outcome::Skipped(reason));
            }
            Err(e) => return self.settle(Err(e)),
        };

        let result = self.pick_and_apply(source.as_ref(), position).await;
        if let Ok(Outcome::Applied(status)) = &result {
            info!("{status}");
        }
        self.settle(result)
    }

    async fn pick_and_apply(&self, source: &dyn PhotoSource, position: Position) -> Result<Outcome, PipelineError> {
        self.enter(Stage::Querying);
        let candidates = source.list_candidates(QueryPurpose::AutoApply).await?;

        self.enter(Stage::Selecting);
        let pool = aggregate::dedup(candidates);
        let chosen = aggregate::select_random(&pool, 1)
            .into_iter()
            .next()
            .ok_or(PipelineError::NoCandidates)?;
        debug!("Selected {} out of {} photo(s)", chosen.id, pool.len());

        self.enter(Stage::Downloading);
        let location = source.locate(&chosen, Quality::Original)?;
        self.download_to_cache(source, &location).await?;

        self.enter(Stage::Applying);
        let method = self.applier.apply(&self.cache_path, position)?;

        Ok(Outcome::Applied(format!(
            "Wallpaper updated from {} on {method} ({} photos available)",
            source.name(),
            pool.len()
        )))
    }

    /// Fetches the image and atomically replaces the cache file.
    async fn download_to_cache(&self, source: &dyn PhotoSource, location: &ImageLocation) -> Result<(), PipelineError> {
        let bytes = source.fetch(location).await?;
        match ImageFormat::sniff(&bytes) {
            Some(format) if format.is_displayable() => {}
            Some(format) => return Err(PipelineError::UnsupportedFormat(format.to_string())),
            None => {
                return Err(PipelineError::NetworkFailure(
                    "Downloaded file is not a valid image".into(),
                ))
            }
        }
        write_cache_file(&self.cache_path, &bytes)?;
        debug!("Cached {} bytes at {}", bytes.len(), self.cache_path.display());
        Ok(())
    }

    /// Returns up to `count` random photos with their thumbnails.
    ///
    /// Never touches the cache file. A thumbnail that fails to load drops that
    /// entry only.
    pub async fn fetch_gallery(&self, config: &Config, count: usize) -> Result<Vec<GalleryItem>, PipelineError> {
        let source = providers::open_source(config).await?;
        self.gallery_from(source.as_ref(), count).await
    }

    pub(crate) async fn gallery_from(&self, source: &dyn PhotoSource, count: usize) -> Result<Vec<GalleryItem>, PipelineError> {
        let pool = aggregate::dedup(source.list_candidates(QueryPurpose::Browse).await?);
        let picked = aggregate::select_random(&pool, count);

        let mut items = Vec::with_capacity(picked.len());
        for candidate in picked {
            let location = match source.locate(&candidate, Quality::Thumbnail) {
                Ok(location) => location,
                Err(e) => {
                    warn!("No thumbnail for {}: {e}", candidate.id);
                    continue;
                }
            };

            let thumbnail = match location {
                ImageLocation::File(_) => None,
                ImageLocation::Remote(_) => match source.fetch(&location).await {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        warn!("Thumbnail for {} failed: {e}", candidate.id);
                        continue;
                    }
                },
            };

            items.push(GalleryItem {
                id: candidate.id,
                thumbnail,
            });
        }

        info!("Gallery: {} of {} photo(s) from {}", items.len(), pool.len(), source.name());
        Ok(items)
    }

    /// Applies the photo with the given id.
    pub async fn apply_selected(&self, config: &Config, id: &str, position: Position) -> Result<Outcome, PipelineError> {
        let Some(_guard) = self.try_begin() else {
            return Ok(Outcome::Skipped("Another wallpaper change is in progress".into()));
        };

        self.enter(Stage::Authenticating);
        let result: Result<Outcome, PipelineError> = async {
            let source = providers::open_source(config).await?;
            self.cache_by_id(source.as_ref(), id).await?;
            self.enter(Stage::Applying);
            let method = self.applier.apply(&self.cache_path, position)?;
            Ok(Outcome::Applied(format!(
                "Wallpaper set to the selected {} photo on {method}",
                source.name()
            )))
        }
        .await;
        self.settle(result)
    }

    /// Downloads the photo with the given id into the cache file without applying it.
    pub async fn prepare_editor_source(&self, config: &Config, id: &str) -> Result<PathBuf, PipelineError> {
        let _guard = self.try_begin().ok_or(PipelineError::Busy)?;

        self.enter(Stage::Authenticating);
        let result: Result<PathBuf, PipelineError> = async {
            let source = providers::open_source(config).await?;
            self.cache_by_id(source.as_ref(), id).await?;
            Ok(self.cache_path.clone())
        }
        .await;
        self.settle(result)
    }

    async fn cache_by_id(&self, source: &dyn PhotoSource, id: &str) -> Result<(), PipelineError> {
        self.enter(Stage::Downloading);
        let location = source.locate_by_id(id, Quality::Original).await?;
        self.download_to_cache(source, &location).await
    }
}
