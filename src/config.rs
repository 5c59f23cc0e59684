//! # Configuration Module
//!
//! User configuration for the photo source and the auto-change schedule.
//!
//! ## Configuration Storage
//! Preferences are stored as JSON in:
//! `~/.config/photowall/config.json` (or the path in `PHOTOWALL_CONFIG`)
//!
//! The pipeline never writes this file. Every operation takes a snapshot with
//! [`Config::load`] and treats it as immutable until the operation ends.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::error::PipelineError;
use crate::wallpaper::Position;

/// Environment variable that overrides the config file location.
pub(crate) const CONFIG_ENV: &str = "PHOTOWALL_CONFIG";

/// Default minutes between automatic wallpaper changes.
const DEFAULT_INTERVAL_MINUTES: u64 = 240;

/// Where photos come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Self-hosted Immich server
    #[default]
    SelfHosted,
    /// Google Photos library
    CloudPhotos,
    /// Folder on the local disk
    Local,
}

/// How candidates are picked inside a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMode {
    /// People/tags (Immich) or content categories (Google)
    #[default]
    ByCategory,
    /// A single album
    ByAlbum,
    /// Whole library
    Random,
}

/// User configuration for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub provider: ProviderKind,
    pub mode: SelectionMode,

    /// Folder scanned by the local provider
    pub local_folder_path: String,

    /// Immich base URL, usually the LAN address
    pub base_url: String,
    /// Secondary Immich URL, usually the public address
    pub fallback_base_url: String,
    pub api_key: String,
    /// Comma-separated person ids; `tag:<id>` entries select tags
    pub immich_person_ids: String,
    pub immich_album_id: String,

    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_refresh_token: String,
    /// Comma-separated content categories (PEOPLE, PETS, LANDSCAPES...)
    pub google_categories: String,
    pub google_album_id: String,

    /// Fit style used by automatic changes
    pub position: Position,
    /// Whether the interval timer triggers automatic changes
    pub auto_change_enabled: bool,
    pub auto_change_interval_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            mode: SelectionMode::default(),
            local_folder_path: dirs::picture_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            base_url: String::new(),
            fallback_base_url: String::new(),
            api_key: String::new(),
            immich_person_ids: String::new(),
            immich_album_id: String::new(),
            google_client_id: String::new(),
            google_client_secret: String::new(),
            google_refresh_token: String::new(),
            google_categories: String::new(),
            google_album_id: String::new(),
            position: Position::Fill,
            auto_change_enabled: false,
            auto_change_interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

/// Splits a comma-separated identifier list, trimming whitespace and dropping empties.
pub fn split_ids(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Returns the path to the configuration file.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::config_dir().map(|p| p.join("photowall/config.json"))
    }

    /// Reads the configuration file. A missing file is the defaults; an unreadable
    /// or unparseable one is an error.
    pub fn read() -> Result<Self, String> {
        let path = Self::config_path().ok_or("Could not determine config path")?;
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| format!("Failed to parse {}: {e}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(format!("Failed to read {}: {e}", path.display())),
        }
    }

    /// Loads the configuration from disk.
    ///
    /// A missing or unparseable file yields the defaults, so callers always get a
    /// usable snapshot; [`Config::validate`] tells them whether it is complete.
    pub fn load() -> Self {
        Self::read().unwrap_or_else(|e| {
            warn!("{e}, using defaults");
            Self::default()
        })
    }

    /// Persists the configuration as pretty-printed JSON.
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path().ok_or("Could not determine config path")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {e}"))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {e}"))?;

        std::fs::write(path, content).map_err(|e| format!("Failed to write config: {e}"))
    }

    /// Checks that the fields the selected provider needs are present.
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self.provider {
            ProviderKind::Local => {
                if self.local_folder_path.trim().is_empty() {
                    return Err(PipelineError::Config("local folder path is not set".into()));
                }
            }
            ProviderKind::SelfHosted => {
                if self.base_url.trim().is_empty() {
                    return Err(PipelineError::Config("Immich base URL is not set".into()));
                }
                if self.api_key.trim().is_empty() {
                    return Err(PipelineError::Config("Immich API key is not set".into()));
                }
            }
            ProviderKind::CloudPhotos => {
                if self.google_refresh_token.trim().is_empty() {
                    return Err(PipelineError::AuthFailure(
                        "Google Photos is not connected (no refresh token)".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Identifier list for the active provider's category mode.
    pub fn category_ids(&self) -> Vec<String> {
        match self.provider {
            ProviderKind::SelfHosted => split_ids(&self.immich_person_ids),
            ProviderKind::CloudPhotos => split_ids(&self.google_categories),
            ProviderKind::Local => Vec::new(),
        }
    }

    /// Album id for the active provider, if one is configured.
    pub fn album_id(&self) -> Option<&str> {
        let id = match self.provider {
            ProviderKind::SelfHosted => self.immich_album_id.trim(),
            ProviderKind::CloudPhotos => self.google_album_id.trim(),
            ProviderKind::Local => "",
        };
        (!id.is_empty()).then_some(id)
    }

    /// Interval between automatic changes, never shorter than one minute.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.auto_change_interval_minutes.max(1) * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ids_trims_and_drops_empties() {
        assert_eq!(split_ids(" p1, tag:t1 ,,"), vec!["p1", "tag:t1"]);
        assert!(split_ids("").is_empty());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"provider":"Local","localFolderPath":"/photos"}"#).unwrap();
        assert_eq!(config.provider, ProviderKind::Local);
        assert_eq!(config.local_folder_path, "/photos");
        assert_eq!(config.mode, SelectionMode::ByCategory);
        assert_eq!(config.position, Position::Fill);
        assert_eq!(config.auto_change_interval_minutes, DEFAULT_INTERVAL_MINUTES);
    }

    #[test]
    fn test_validate_self_hosted_requires_key() {
        let config = Config {
            provider: ProviderKind::SelfHosted,
            base_url: "http://immich.lan:2283".into(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_cloud_without_token_is_auth_failure() {
        let config = Config {
            provider: ProviderKind::CloudPhotos,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::AuthFailure(_))));
    }

    #[test]
    fn test_album_id_per_provider() {
        let config = Config {
            provider: ProviderKind::CloudPhotos,
            immich_album_id: "immich-album".into(),
            google_album_id: " ".into(),
            ..Config::default()
        };
        assert_eq!(config.album_id(), None);
    }

    #[test]
    fn test_interval_has_floor() {
        let config = Config {
            auto_change_interval_minutes: 0,
            ..Config::default()
        };
        assert_eq!(config.interval().as_secs(), 60);
    }
}
