//! # Photo Providers
//!
//! One contract over three photo sources:
//!
//! | Provider   | Auth                    | Candidate id   |
//! |------------|-------------------------|----------------|
//! | Local      | none                    | absolute path  |
//! | Immich     | `x-api-key`             | asset id       |
//! | Google     | OAuth bearer token      | media item id  |
//!
//! A source is opened per operation by [`open_source`], which resolves the
//! endpoint and refreshes the credential. Nothing survives the operation.

pub mod google;
pub mod immich;
pub mod local;

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::config::{Config, ProviderKind};
use crate::error::PipelineError;
use crate::http;

/// Image size to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Thumbnail,
    Original,
}

/// Why candidates are listed. Browsing asks for a larger pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPurpose {
    AutoApply,
    Browse,
}

impl QueryPurpose {
    /// Maximum items requested per query.
    pub fn size_cap(self) -> u32 {
        match self {
            QueryPurpose::AutoApply => 500,
            QueryPurpose::Browse => 1000,
        }
    }
}

/// A photo that may be shown or applied. Equal ids are the same photo.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub payload: CandidatePayload,
}

/// Provider-specific data carried with a candidate.
#[derive(Debug, Clone)]
pub enum CandidatePayload {
    LocalFile(PathBuf),
    Immich(immich::Asset),
    Google(google::MediaItem),
}

/// Where the bytes of an image can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    File(PathBuf),
    Remote(String),
}

/// A configured, authenticated photo source.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Display name used in status messages.
    fn name(&self) -> &'static str;

    async fn list_candidates(&self, purpose: QueryPurpose) -> Result<Vec<Candidate>, PipelineError>;

    /// Location of a listed candidate at the given quality.
    fn locate(&self, candidate: &Candidate, quality: Quality) -> Result<ImageLocation, PipelineError>;

    /// Location of a photo known only by id.
    async fn locate_by_id(&self, id: &str, quality: Quality) -> Result<ImageLocation, PipelineError>;

    /// Reads the image bytes.
    async fn fetch(&self, location: &ImageLocation) -> Result<Vec<u8>, PipelineError>;
}

/// Reads a location with the source's authenticated client.
pub(crate) async fn read_location(
    client: &reqwest::Client,
    location: &ImageLocation,
) -> Result<Vec<u8>, PipelineError> {
    match location {
        ImageLocation::File(path) => Ok(tokio::fs::read(path).await?),
        ImageLocation::Remote(url) => http::download_bytes(client, url).await,
    }
}

/// Opens the configured provider for one operation.
pub async fn open_source(config: &Config) -> Result<Box<dyn PhotoSource>, PipelineError> {
    config.validate()?;
    debug!("Opening {:?} provider in {:?} mode", config.provider, config.mode);

    let source: Box<dyn PhotoSource> = match config.provider {
        ProviderKind::Local => Box::new(local::LocalSource::new(config)),
        ProviderKind::SelfHosted => Box::new(immich::ImmichSource::connect(config).await?),
        ProviderKind::CloudPhotos => Box::new(google::GoogleSource::connect(config).await?),
    };
    Ok(source)
}

/// Gathers per-query outcomes into one list.
///
/// A query answered with a non-success status contributes nothing. Transport
/// errors are swallowed too, unless every query failed that way.
pub(crate) fn union_results<T>(
    outcomes: Vec<Result<Option<Vec<T>>, PipelineError>>,
) -> Result<Vec<T>, PipelineError> {
    let total = outcomes.len();
    let mut items = Vec::new();
    let mut last_error = None;
    let mut failures = 0;

    for outcome in outcomes {
        match outcome {
            Ok(Some(batch)) => items.extend(batch),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Query failed: {e}");
                failures += 1;
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if failures == total => Err(e),
        _ => Ok(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_caps() {
        assert_eq!(QueryPurpose::AutoApply.size_cap(), 500);
        assert_eq!(QueryPurpose::Browse.size_cap(), 1000);
    }

    #[test]
    fn test_union_skips_rejected_queries() {
        let outcomes = vec![Ok(Some(vec![1, 2])), Ok(None), Ok(Some(vec![3]))];
        assert_eq!(union_results(outcomes).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_union_partial_transport_failure_is_swallowed() {
        let outcomes = vec![Err(PipelineError::NetworkFailure("reset".into())), Ok(Some(vec![7]))];
        assert_eq!(union_results(outcomes).unwrap(), vec![7]);
    }

    #[test]
    fn test_union_total_transport_failure_aborts() {
        let outcomes: Vec<Result<Option<Vec<u8>>, _>> =
            vec![Err(PipelineError::NetworkFailure("timed out".into()))];
        assert!(matches!(union_results(outcomes), Err(PipelineError::NetworkFailure(_))));
    }

    #[test]
    fn test_union_of_no_queries_is_empty() {
        let outcomes: Vec<Result<Option<Vec<u8>>, PipelineError>> = Vec::new();
        assert!(union_results(outcomes).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_location_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let client = reqwest::Client::new();
        let bytes = read_location(&client, &ImageLocation::File(path)).await.unwrap();
        assert_eq!(bytes, b"jpeg");
    }
}
