//! # Wallpaper Applier
//!
//! Sets an image file as the desktop background on every monitor.
//!
//! ## Strategy
//! 1. Open a session with the desktop's modern multi-monitor API
//! 2. Set the fit style, then set the image on each monitor by device id
//! 3. If any step fails, log it and fall back to the legacy single-image call
//!
//! The platform specifics live behind [`DesktopBackend`]: the Windows shell
//! (`IDesktopWallpaper` with `SystemParametersInfoW` as fallback) and the
//! COSMIC desktop (per-output background config with the `all` entry as
//! fallback).
//!
//! ## Cache File
//! The downloaded image is written to a fixed path in the temp directory and
//! replaced atomically, so the desktop never reads a half-written file.

#[cfg(not(target_os = "windows"))]
pub mod cosmic;
#[cfg(target_os = "windows")]
pub mod windows;

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the single cache file the pipeline overwrites.
pub const CACHE_FILE_NAME: &str = "photowall_source.jpg";

/// Backend for the platform this binary was built for.
#[cfg(target_os = "windows")]
pub type PlatformBackend = windows::WindowsDesktop;
#[cfg(not(target_os = "windows"))]
pub type PlatformBackend = cosmic::CosmicDesktop;

/// How the image is fitted to each monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Center,
    Tile,
    Stretch,
    Fit,
    #[default]
    Fill,
    Span,
}

impl Position {
    pub const ALL: [Position; 6] = [
        Position::Center,
        Position::Tile,
        Position::Stretch,
        Position::Fit,
        Position::Fill,
        Position::Span,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Center => "center",
            Position::Tile => "tile",
            Position::Stretch => "stretch",
            Position::Fit => "fit",
            Position::Fill => "fill",
            Position::Span => "span",
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Position::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| {
                format!("Unknown position '{s}' (expected center, tile, stretch, fit, fill or span)")
            })
    }
}

/// Errors from the desktop wallpaper calls.
#[derive(Debug, Error)]
pub enum WallpaperError {
    /// The multi-monitor API could not be opened or rejected a call.
    #[error("multi-monitor wallpaper API failed: {0}")]
    Modern(String),
    /// The desktop reported no monitors.
    #[error("no monitors reported by the desktop")]
    NoMonitors,
    /// The legacy single-image call failed too.
    #[error("legacy wallpaper call failed: {0}")]
    Legacy(String),
    #[error("wallpaper file error: {0}")]
    Io(#[from] std::io::Error),
}

/// A platform's wallpaper API.
///
/// The modern path runs inside a session so resources like a COM instance
/// stay alive across the per-monitor calls.
pub trait DesktopBackend: Send + Sync {
    type Session: WallpaperSession;

    fn open_session(&self) -> Result<Self::Session, WallpaperError>;

    /// Sets one image for the whole desktop using the oldest supported call.
    fn set_legacy(&self, path: &Path) -> Result<(), WallpaperError>;
}

/// One use of the multi-monitor API.
pub trait WallpaperSession {
    fn set_position(&mut self, position: Position) -> Result<(), WallpaperError>;

    fn monitor_ids(&mut self) -> Result<Vec<String>, WallpaperError>;

    fn set_monitor_wallpaper(&mut self, monitor: &str, path: &Path) -> Result<(), WallpaperError>;

    /// Called once after every monitor was set.
    fn finish(self) -> Result<(), WallpaperError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Which API ended up setting the wallpaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMethod {
    PerMonitor(usize),
    Legacy,
}

impl std::fmt::Display for ApplyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyMethod::PerMonitor(1) => write!(f, "1 monitor"),
            ApplyMethod::PerMonitor(n) => write!(f, "{n} monitors"),
            ApplyMethod::Legacy => write!(f, "all monitors (legacy)"),
        }
    }
}

/// Applies images through a [`DesktopBackend`], falling back to its legacy call.
pub struct WallpaperApplier<B: DesktopBackend> {
    backend: B,
}

impl<B: DesktopBackend> WallpaperApplier<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Sets `path` as the wallpaper of every monitor.
    ///
    /// A failure of the modern API is logged and answered with the legacy call;
    /// only a failing legacy call is returned as an error.
    pub fn apply(&self, path: &Path, position: Position) -> Result<ApplyMethod, WallpaperError> {
        match self.apply_per_monitor(path, position) {
            Ok(count) => {
                debug!("Wallpaper set with {position}");
                Ok(ApplyMethod::PerMonitor(count))
            }
            Err(e) => {
                warn!("Per-monitor wallpaper failed ({e}), using legacy call");
                self.backend.set_legacy(path)?;
                Ok(ApplyMethod::Legacy)
            }
        }
    }

    fn apply_per_monitor(&self, path: &Path, position: Position) -> Result<usize, WallpaperError> {
        let mut session = self.backend.open_session()?;
        session.set_position(position)?;

        let monitors = session.monitor_ids()?;
        if monitors.is_empty() {
            return Err(WallpaperError::NoMonitors);
        }

        for monitor in &monitors {
            debug!("Setting wallpaper on {monitor}");
            session.set_monitor_wallpaper(monitor, path)?;
        }

        session.finish()?;
        Ok(monitors.len())
    }
}

/// Default location of the wallpaper cache file.
pub fn default_cache_path() -> PathBuf {
    std::env::temp_dir().join(CACHE_FILE_NAME)
}

/// Replaces the cache file with `bytes` via a temp file in the same directory.
pub fn write_cache_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Image container recognized from a file's magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
    Gif,
    Tiff,
    Webp,
    Heif,
    Avif,
}

impl ImageFormat {
    /// Identifies a downloaded file.
    ///
    /// Servers answer some failures with an HTML page and a 200 status. Those
    /// come back as `None` and must never reach the desktop.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(Self::Png);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            return Some(Self::Tiff);
        }
        if bytes.starts_with(b"BM") {
            return Some(Self::Bmp);
        }
        if bytes.len() < 12 {
            return None;
        }
        match (&bytes[0..4], &bytes[4..8], &bytes[8..12]) {
            (b"RIFF", _, b"WEBP") => Some(Self::Webp),
            (_, b"ftyp", b"avif" | b"avis") => Some(Self::Avif),
            (_, b"ftyp", b"heic" | b"heix" | b"heim" | b"heis" | b"hevc" | b"hevx" | b"mif1" | b"msf1") => {
                Some(Self::Heif)
            }
            _ => None,
        }
    }

    /// Whether every supported desktop can render it as a background.
    pub fn is_displayable(self) -> bool {
        !matches!(self, Self::Heif | Self::Avif)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Bmp => "BMP",
            Self::Gif => "GIF",
            Self::Tiff => "TIFF",
            Self::Webp => "WebP",
            Self::Heif => "HEIC",
            Self::Avif => "AVIF",
        };
        f.write_str(name)
    }
}

/// Backend double recording every call.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Position(Position),
        Monitor(String, PathBuf),
        Finish,
        Legacy(PathBuf),
    }

    #[derive(Clone, Default)]
    pub struct RecordingDesktop {
        pub monitors: Vec<String>,
        pub fail_open: bool,
        pub fail_legacy: bool,
        pub calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingDesktop {
        pub fn with_monitors(monitors: &[&str]) -> Self {
            Self {
                monitors: monitors.iter().map(|m| m.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    pub struct RecordingSession {
        monitors: Vec<String>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl DesktopBackend for RecordingDesktop {
        type Session = RecordingSession;

        fn open_session(&self) -> Result<RecordingSession, WallpaperError> {
            if self.fail_open {
                return Err(WallpaperError::Modern("class not registered".into()));
            }
            Ok(RecordingSession {
                monitors: self.monitors.clone(),
                calls: self.calls.clone(),
            })
        }

        fn set_legacy(&self, path: &Path) -> Result<(), WallpaperError> {
            if self.fail_legacy {
                return Err(WallpaperError::Legacy("access denied".into()));
            }
            self.calls.lock().unwrap().push(Call::Legacy(path.to_path_buf()));
            Ok(())
        }
    }

    impl WallpaperSession for RecordingSession {
        fn set_position(&mut self, position: Position) -> Result<(), WallpaperError> {
            self.calls.lock().unwrap().push(Call::Position(position));
            Ok(())
        }

        fn monitor_ids(&mut self) -> Result<Vec<String>, WallpaperError> {
            Ok(self.monitors.clone())
        }

        fn set_monitor_wallpaper(&mut self, monitor: &str, path: &Path) -> Result<(), WallpaperError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Monitor(monitor.to_string(), path.to_path_buf()));
            Ok(())
        }

        fn finish(self) -> Result<(), WallpaperError> {
            self.calls.lock().unwrap().push(Call::Finish);
            Ok(())
        }
    }
}
