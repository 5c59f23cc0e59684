//! # Error Types
//!
//! Failure taxonomy shared by the providers and the pipeline orchestrator.
//!
//! - `AuthFailure`: the credential was rejected or could not be refreshed. Needs user
//!   action; never retried.
//! - `NetworkFailure`: a request failed in transit. Per-query failures are swallowed by
//!   the providers; only the final download surfaces this variant.
//! - `NoCandidates`: every query succeeded (or was skipped) but nothing usable came back.
//! - `ApplyFailure`: the desktop refused the wallpaper even after the legacy fallback.
//! - `UnsupportedFormat`: the photo downloaded fine but the desktop cannot show it.
//! - `Busy`: an interactive request hit the single-flight guard.

use thiserror::Error;

use crate::wallpaper::WallpaperError;

/// Errors produced by a pipeline operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad or expired credential.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),
    /// Transport error or non-success response on a step that cannot be skipped.
    #[error("Network error: {0}")]
    NetworkFailure(String),
    /// The provider answered but yielded no photos.
    #[error("No photos found for the configured source")]
    NoCandidates,
    /// The OS wallpaper call failed.
    #[error("Failed to apply wallpaper: {0}")]
    ApplyFailure(#[from] WallpaperError),
    /// The downloaded photo is in a format the desktop cannot render.
    #[error("{0} photos cannot be used as a wallpaper, pick a JPEG or PNG one")]
    UnsupportedFormat(String),
    /// Another operation is writing the wallpaper cache.
    #[error("Another wallpaper change is in progress")]
    Busy,
    /// Required configuration field missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Local file system error (listing, cache write).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::NetworkFailure("Request timed out - check your connection".to_string())
        } else {
            Self::NetworkFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::NetworkFailure(format!("Unexpected response shape: {err}"))
    }
}

impl From<PipelineError> for zbus::fdo::Error {
    fn from(err: PipelineError) -> Self {
        zbus::fdo::Error::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_candidates_display() {
        let msg = PipelineError::NoCandidates.to_string();
        assert!(msg.contains("No photos"));
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_apply_failure_wraps_wallpaper_error() {
        let err: PipelineError = WallpaperError::Legacy("denied".to_string()).into();
        assert!(matches!(err, PipelineError::ApplyFailure(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_json_error_is_network_failure() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: PipelineError = json_err.into();
        assert!(matches!(err, PipelineError::NetworkFailure(_)));
    }
}
