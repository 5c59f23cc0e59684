//! # COSMIC Desktop Backend
//!
//! COSMIC reads its background configuration from RON files under
//! `~/.config/cosmic/com.system76.CosmicBackground/v1/`:
//!
//! - `output.<name>`: background for one output
//! - `backgrounds`: list of outputs with their own entry
//! - `same-on-all`: whether `all` overrides every output
//! - `all`: background used when `same-on-all` is true
//!
//! Outputs are discovered from the connected DRM connectors in
//! `/sys/class/drm`. COSMIC has no "reload config" call, so after writing
//! the files the `cosmic-bg` renderer is restarted.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::{DesktopBackend, Position, WallpaperError, WallpaperSession};

/// Background config directory, relative to the home directory.
const BACKGROUND_CONFIG_DIR: &str = ".config/cosmic/com.system76.CosmicBackground/v1";

const DRM_DIR: &str = "/sys/class/drm";

/// Checks if the application is running inside a Flatpak sandbox.
pub fn is_flatpak() -> bool {
    Path::new("/.flatpak-info").exists()
}

/// Runs a command on the host, through `flatpak-spawn --host` when sandboxed.
fn run_host_command(cmd: &str, args: &[&str]) -> std::io::Result<std::process::Output> {
    if is_flatpak() {
        let mut spawn_args = vec!["--host", cmd];
        spawn_args.extend(args);
        std::process::Command::new("flatpak-spawn").args(&spawn_args).output()
    } else {
        std::process::Command::new(cmd).args(args).output()
    }
}

/// Like `run_host_command` but does not wait for the command to finish.
fn spawn_host_command(cmd: &str) -> std::io::Result<std::process::Child> {
    if is_flatpak() {
        std::process::Command::new("flatpak-spawn").args(["--host", cmd]).spawn()
    } else {
        std::process::Command::new(cmd).spawn()
    }
}

/// Maps a fit style to COSMIC's `scaling_mode`. COSMIC has no center, tile or span.
fn scaling_mode(position: Position) -> &'static str {
    match position {
        Position::Stretch => "Stretch",
        Position::Fit => "Fit((0.0, 0.0, 0.0))",
        Position::Fill | Position::Center | Position::Tile | Position::Span => "Zoom",
    }
}

fn background_entry(output: &str, image: &Path, scaling: &str) -> String {
    format!(
        r#"(
    output: "{output}",
    source: Path("{}"),
    filter_by_theme: false,
    rotation_frequency: 300,
    filter_method: Lanczos,
    scaling_mode: {scaling},
    sampling_method: Alphanumeric,
)"#,
        image.display()
    )
}

/// Lists connected DRM connectors (`card1-DP-1` becomes `DP-1`).
fn connected_outputs(drm_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut outputs = Vec::new();

    for entry in std::fs::read_dir(drm_dir)?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some((card, connector)) = name.split_once('-') else {
            continue;
        };
        if !card.starts_with("card") {
            continue;
        }

        let status = std::fs::read_to_string(entry.path().join("status")).unwrap_or_default();
        if status.trim() == "connected" {
            outputs.push(connector.to_string());
        }
    }

    outputs.sort();
    outputs.dedup();
    Ok(outputs)
}

/// Restarts `cosmic-bg` so it picks up the new config.
fn restart_renderer() -> Result<(), WallpaperError> {
    let _ = run_host_command("pkill", &["-TERM", "-x", "cosmic-bg"]);

    // COSMIC's session manager usually respawns it on its own
    std::thread::sleep(Duration::from_millis(1000));

    match run_host_command("pgrep", &["-x", "cosmic-bg"]) {
        Ok(output) if output.status.success() => Ok(()),
        _ => {
            debug!("cosmic-bg not respawned, starting it");
            spawn_host_command("cosmic-bg")
                .map_err(|e| WallpaperError::Modern(format!("Failed to start cosmic-bg: {e}")))?;
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        }
    }
}

/// The COSMIC desktop.
#[derive(Debug, Clone)]
pub struct CosmicDesktop {
    config_dir: Option<PathBuf>,
    drm_dir: PathBuf,
    restart: bool,
}

impl Default for CosmicDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl CosmicDesktop {
    /// Uses the real host locations.
    ///
    /// `home_dir()` rather than `config_dir()`: inside Flatpak the latter points
    /// into the sandbox, but COSMIC reads the host's `~/.config`.
    pub fn new() -> Self {
        Self {
            config_dir: dirs::home_dir().map(|home| home.join(BACKGROUND_CONFIG_DIR)),
            drm_dir: PathBuf::from(DRM_DIR),
            restart: true,
        }
    }

    /// Custom locations without restarting the renderer.
    #[cfg(test)]
    pub fn with_dirs(config_dir: PathBuf, drm_dir: PathBuf) -> Self {
        Self {
            config_dir: Some(config_dir),
            drm_dir,
            restart: false,
        }
    }

    fn config_dir(&self) -> Result<&Path, WallpaperError> {
        self.config_dir
            .as_deref()
            .ok_or_else(|| WallpaperError::Modern("Could not find home directory".into()))
    }
}

fn write_entry(dir: &Path, key: &str, content: &str) -> Result<(), WallpaperError> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(key), content)?;
    Ok(())
}

/// Per-output configuration in progress.
pub struct CosmicSession {
    config_dir: PathBuf,
    drm_dir: PathBuf,
    scaling: &'static str,
    written: Vec<String>,
    restart: bool,
}

impl DesktopBackend for CosmicDesktop {
    type Session = CosmicSession;

    fn open_session(&self) -> Result<CosmicSession, WallpaperError> {
        Ok(CosmicSession {
            config_dir: self.config_dir()?.to_path_buf(),
            drm_dir: self.drm_dir.clone(),
            scaling: scaling_mode(Position::Fill),
            written: Vec::new(),
            restart: self.restart,
        })
    }

    fn set_legacy(&self, path: &Path) -> Result<(), WallpaperError> {
        let legacy = |e: WallpaperError| WallpaperError::Legacy(e.to_string());
        let dir = self.config_dir().map_err(legacy)?;

        write_entry(dir, "all", &background_entry("all", path, scaling_mode(Position::Fill))).map_err(legacy)?;
        write_entry(dir, "same-on-all", "true").map_err(legacy)?;

        if self.restart {
            restart_renderer().map_err(legacy)?;
        }
        Ok(())
    }
}

impl WallpaperSession for CosmicSession {
    fn set_position(&mut self, position: Position) -> Result<(), WallpaperError> {
        if matches!(position, Position::Center | Position::Tile | Position::Span) {
            warn!("COSMIC has no {position} mode, using zoom");
        }
        self.scaling = scaling_mode(position);
        Ok(())
    }

    fn monitor_ids(&mut self) -> Result<Vec<String>, WallpaperError> {
        connected_outputs(&self.drm_dir)
            .map_err(|e| WallpaperError::Modern(format!("Failed to list outputs: {e}")))
    }

    fn set_monitor_wallpaper(&mut self, monitor: &str, path: &Path) -> Result<(), WallpaperError> {
        let entry = background_entry(monitor, path, self.scaling);
        write_entry(&self.config_dir, &format!("output.{monitor}"), &entry)?;
        self.written.push(monitor.to_string());
        Ok(())
    }

    fn finish(self) -> Result<(), WallpaperError> {
        let list = self
            .written
            .iter()
            .map(|o| format!("\"{o}\""))
            .collect::<Vec<_>>()
            .join(", ");
        write_entry(&self.config_dir, "backgrounds", &format!("[{list}]"))?;
        write_entry(&self.config_dir, "same-on-all", "false")?;

        if self.restart {
            restart_renderer()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallpaper::{ApplyMethod, WallpaperApplier};

    fn fake_drm(root: &Path, connectors: &[(&str, &str)]) {
        for (name, status) in connectors {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("status"), format!("{status}\n")).unwrap();
        }
        std::fs::create_dir_all(root.join("renderD128")).unwrap();
    }

    #[test]
    fn test_connected_outputs_skips_disconnected() {
        let drm = tempfile::tempdir().unwrap();
        fake_drm(
            drm.path(),
            &[("card1-DP-1", "connected"), ("card1-HDMI-A-1", "disconnected"), ("card1-eDP-1", "connected")],
        );
        assert_eq!(connected_outputs(drm.path()).unwrap(), vec!["DP-1", "eDP-1"]);
    }

    #[test]
    fn test_apply_writes_entry_per_output() {
        let config = tempfile::tempdir().unwrap();
        let drm = tempfile::tempdir().unwrap();
        fake_drm(drm.path(), &[("card0-DP-1", "connected"), ("card0-DP-2", "connected")]);

        let desktop = CosmicDesktop::with_dirs(config.path().to_path_buf(), drm.path().to_path_buf());
        let applier = WallpaperApplier::new(desktop);
        let image = Path::new("/tmp/photowall_source.jpg");

        assert_eq!(applier.apply(image, Position::Fit).unwrap(), ApplyMethod::PerMonitor(2));

        let dp1 = std::fs::read_to_string(config.path().join("output.DP-1")).unwrap();
        assert!(dp1.contains("output: \"DP-1\""));
        assert!(dp1.contains("source: Path(\"/tmp/photowall_source.jpg\")"));
        assert!(dp1.contains("scaling_mode: Fit((0.0, 0.0, 0.0))"));
        assert!(config.path().join("output.DP-2").exists());

        let backgrounds = std::fs::read_to_string(config.path().join("backgrounds")).unwrap();
        assert_eq!(backgrounds, "[\"DP-1\", \"DP-2\"]");
        assert_eq!(std::fs::read_to_string(config.path().join("same-on-all")).unwrap(), "false");
    }

    #[test]
    fn test_no_outputs_falls_back_to_all_entry() {
        let config = tempfile::tempdir().unwrap();
        let drm = tempfile::tempdir().unwrap();

        let desktop = CosmicDesktop::with_dirs(config.path().to_path_buf(), drm.path().to_path_buf());
        let applier = WallpaperApplier::new(desktop);

        let method = applier.apply(Path::new("/tmp/a.jpg"), Position::Fill).unwrap();
        assert_eq!(method, ApplyMethod::Legacy);

        let all = std::fs::read_to_string(config.path().join("all")).unwrap();
        assert!(all.contains("output: \"all\""));
        assert!(all.contains("scaling_mode: Zoom"));
    }
}
