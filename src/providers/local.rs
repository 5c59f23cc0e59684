//! Photos from a folder on disk.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Candidate, CandidatePayload, ImageLocation, PhotoSource, Quality, QueryPurpose};
use crate::config::Config;
use crate::error::PipelineError;

const AUTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const BROWSE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Returns true when the file extension is in the allow-list for `purpose`.
pub fn is_supported(path: &Path, purpose: QueryPurpose) -> bool {
    let allowed = match purpose {
        QueryPurpose::AutoApply => AUTO_EXTENSIONS,
        QueryPurpose::Browse => BROWSE_EXTENSIONS,
    };
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| e.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

pub struct LocalSource {
    folder: PathBuf,
}

impl LocalSource {
    pub fn new(config: &Config) -> Self {
        Self {
            folder: PathBuf::from(config.local_folder_path.trim()),
        }
    }
}

#[async_trait]
impl PhotoSource for LocalSource {
    fn name(&self) -> &'static str {
        "local folder"
    }

    async fn list_candidates(&self, purpose: QueryPurpose) -> Result<Vec<Candidate>, PipelineError> {
        if self.folder.as_os_str().is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = match tokio::fs::read_dir(&self.folder).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read {}: {e}", self.folder.display());
                return Ok(Vec::new());
            }
        };

        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || !is_supported(&path, purpose) {
                continue;
            }
            let path = std::path::absolute(&path).unwrap_or(path);
            candidates.push(Candidate {
                id: path.to_string_lossy().to_string(),
                payload: CandidatePayload::LocalFile(path),
            });
        }

        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        debug!("{} image(s) in {}", candidates.len(), self.folder.display());
        Ok(candidates)
    }

    fn locate(&self, candidate: &Candidate, _quality: Quality) -> Result<ImageLocation, PipelineError> {
        match &candidate.payload {
            CandidatePayload::LocalFile(path) => Ok(ImageLocation::File(path.clone())),
            _ => Ok(ImageLocation::File(PathBuf::from(&candidate.id))),
        }
    }

    async fn locate_by_id(&self, id: &str, _quality: Quality) -> Result<ImageLocation, PipelineError> {
        let path = PathBuf::from(id);
        if !path.is_file() {
            return Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{id} does not exist"),
            )));
        }
        Ok(ImageLocation::File(path))
    }

    async fn fetch(&self, location: &ImageLocation) -> Result<Vec<u8>, PipelineError> {
        match location {
            ImageLocation::File(path) => Ok(tokio::fs::read(path).await?),
            ImageLocation::Remote(url) => Err(PipelineError::Config(format!(
                "local folder cannot download {url}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_for(dir: &Path) -> LocalSource {
        LocalSource {
            folder: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        assert!(is_supported(Path::new("/p/IMG_1.JPG"), QueryPurpose::AutoApply));
        assert!(is_supported(Path::new("/p/a.Jpeg"), QueryPurpose::AutoApply));
        assert!(!is_supported(Path::new("/p/c.txt"), QueryPurpose::Browse));
        assert!(!is_supported(Path::new("/p/noext"), QueryPurpose::Browse));
    }

    #[test]
    fn test_bmp_only_when_browsing() {
        assert!(!is_supported(Path::new("/p/scan.bmp"), QueryPurpose::AutoApply));
        assert!(is_supported(Path::new("/p/scan.bmp"), QueryPurpose::Browse));
    }

    #[tokio::test]
    async fn test_lists_only_images() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.jpg", "b.png", "c.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let candidates = source_for(dir.path()).list_candidates(QueryPurpose::Browse).await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].id.ends_with("a.jpg"));
        assert!(candidates[1].id.ends_with("b.png"));
    }

    #[tokio::test]
    async fn test_missing_folder_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(&dir.path().join("gone"));
        assert!(source.list_candidates(QueryPurpose::AutoApply).await.unwrap().is_empty());

        let empty = LocalSource { folder: PathBuf::new() };
        assert!(empty.list_candidates(QueryPurpose::AutoApply).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locate_by_id_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(dir.path());
        let missing = dir.path().join("missing.jpg");
        assert!(source.locate_by_id(&missing.to_string_lossy(), Quality::Original).await.is_err());
    }
}
