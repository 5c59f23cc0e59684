//! # Google Photos Provider
//!
//! Uses the Photos Library API with a bearer token from the credential
//! refresher. Each mode issues exactly one request of up to 100 items:
//!
//! - ByCategory: `mediaItems:search` with a content-category filter
//! - ByAlbum: `mediaItems:search` scoped to an album
//! - Random, or either mode with nothing configured: `GET mediaItems`
//!
//! `baseUrl` values expire after about an hour, which is far longer than one
//! operation. Size is requested with a `=wW-hH` suffix.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{read_location, Candidate, CandidatePayload, ImageLocation, PhotoSource, Quality, QueryPurpose};
use crate::config::{Config, SelectionMode};
use crate::credential::refresh_access_token;
use crate::error::PipelineError;
use crate::http::{create_client, Auth};

/// Photos Library API root.
pub const API_BASE: &str = "https://photoslibrary.googleapis.com/v1";

/// Largest page the API serves.
const PAGE_SIZE: u32 = 100;

const THUMBNAIL_SUFFIX: &str = "=w500-h500";
const ORIGINAL_SUFFIX: &str = "=w2500-h2500";

/// Body of `POST mediaItems:search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    pub content_filter: ContentFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilter {
    pub included_content_categories: Vec<String>,
}

/// Response of both `GET mediaItems` and `POST mediaItems:search`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemsResponse {
    #[serde(default)]
    pub media_items: Vec<MediaItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl MediaItem {
    fn is_usable(&self) -> bool {
        let video = self
            .mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with("video/"));
        !video && self.base_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// `baseUrl` sized for the requested quality.
    pub fn sized_url(&self, quality: Quality) -> Option<String> {
        let suffix = match quality {
            Quality::Thumbnail => THUMBNAIL_SUFFIX,
            Quality::Original => ORIGINAL_SUFFIX,
        };
        self.base_url.as_ref().map(|base| format!("{base}{suffix}"))
    }
}

/// The single request a mode issues.
#[derive(Debug, Clone, PartialEq)]
pub enum GoogleQuery {
    Search(SearchRequest),
    ListAll,
}

pub fn plan_query(mode: SelectionMode, categories: &[String], album_id: Option<&str>) -> GoogleQuery {
    match mode {
        SelectionMode::ByCategory if !categories.is_empty() => GoogleQuery::Search(SearchRequest {
            album_id: None,
            filters: Some(Filters {
                content_filter: ContentFilter {
                    included_content_categories: categories.to_vec(),
                },
            }),
            page_size: PAGE_SIZE,
        }),
        SelectionMode::ByAlbum => match album_id {
            Some(id) => GoogleQuery::Search(SearchRequest {
                album_id: Some(id.to_string()),
                filters: None,
                page_size: PAGE_SIZE,
            }),
            None => GoogleQuery::ListAll,
        },
        _ => GoogleQuery::ListAll,
    }
}

fn to_candidates(items: Vec<MediaItem>) -> Vec<Candidate> {
    items
        .into_iter()
        .filter(MediaItem::is_usable)
        .map(|item| Candidate {
            id: item.id.clone(),
            payload: CandidatePayload::Google(item),
        })
        .collect()
}

/// Refreshes the access token and builds a bearer client, shared with discovery.
pub(crate) async fn connect_client(config: &Config) -> Result<reqwest::Client, PipelineError> {
    let token_client = create_client(&Auth::Anonymous)?;
    let credential = refresh_access_token(
        &token_client,
        &config.google_client_id,
        &config.google_client_secret,
        &config.google_refresh_token,
    )
    .await
    .ok_or_else(|| PipelineError::AuthFailure("Could not refresh the Google Photos access token".into()))?;

    create_client(&Auth::Bearer(credential.token().to_string()))
}

/// An authenticated Google Photos session.
pub struct GoogleSource {
    client: reqwest::Client,
    api_base: String,
    mode: SelectionMode,
    categories: Vec<String>,
    album_id: Option<String>,
}

impl GoogleSource {
    pub async fn connect(config: &Config) -> Result<Self, PipelineError> {
        Ok(Self {
            client: connect_client(config).await?,
            api_base: API_BASE.to_string(),
            mode: config.mode,
            categories: config.category_ids(),
            album_id: config.album_id().map(str::to_string),
        })
    }

    /// `{api_base}/mediaItems/{id}` with the id as one escaped path segment.
    fn media_item_url(&self, id: &str) -> Result<reqwest::Url, PipelineError> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| PipelineError::Config(format!("Invalid API base {}: {e}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::Config(format!("Invalid API base {}", self.api_base)))?
            .pop_if_empty()
            .push("mediaItems")
            .push(id);
        Ok(url)
    }
}

#[async_trait]
impl PhotoSource for GoogleSource {
    fn name(&self) -> &'static str {
        "Google Photos"
    }

    async fn list_candidates(&self, _purpose: QueryPurpose) -> Result<Vec<Candidate>, PipelineError> {
        let query = plan_query(self.mode, &self.categories, self.album_id.as_deref());

        let response = match &query {
            GoogleQuery::Search(body) => {
                self.client
                    .post(format!("{}/mediaItems:search", self.api_base))
                    .json(body)
                    .send()
                    .await?
            }
            GoogleQuery::ListAll => {
                self.client
                    .get(format!("{}/mediaItems", self.api_base))
                    .query(&[("pageSize", PAGE_SIZE)])
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Google Photos query returned HTTP {status}");
            return Ok(Vec::new());
        }

        let body: MediaItemsResponse = serde_json::from_str(&response.text().await?)?;
        let candidates = to_candidates(body.media_items);
        debug!("{} Google Photos candidate(s)", candidates.len());
        Ok(candidates)
    }

    fn locate(&self, candidate: &Candidate, quality: Quality) -> Result<ImageLocation, PipelineError> {
        match &candidate.payload {
            CandidatePayload::Google(item) => item
                .sized_url(quality)
                .map(ImageLocation::Remote)
                .ok_or_else(|| PipelineError::NetworkFailure(format!("{} has no baseUrl", candidate.id))),
            _ => Err(PipelineError::Config(format!("{} is not a Google Photos item", candidate.id))),
        }
    }

    async fn locate_by_id(&self, id: &str, quality: Quality) -> Result<ImageLocation, PipelineError> {
        let response = self.client.get(self.media_item_url(id)?).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::NetworkFailure(format!(
                "Media item lookup returned HTTP {status}"
            )));
        }

        let item: MediaItem = serde_json::from_str(&response.text().await?)?;
        item.sized_url(quality)
            .map(ImageLocation::Remote)
            .ok_or_else(|| PipelineError::NetworkFailure(format!("{id} has no baseUrl")))
    }

    async fn fetch(&self, location: &ImageLocation) -> Result<Vec<u8>, PipelineError> {
        read_location(&self.client, location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::split_ids;
    use crate::http::stub;

    fn source_at(api_base: &str, mode: SelectionMode) -> GoogleSource {
        GoogleSource {
            client: create_client(&Auth::Bearer("access".into())).unwrap(),
            api_base: api_base.to_string(),
            mode,
            categories: Vec::new(),
            album_id: None,
        }
    }

    #[tokio::test]
    async fn test_rejected_listing_is_empty() {
        let (base, server) = stub::serve(vec![(403, r#"{"error":{"code":403}}"#)]).await;
        let source = source_at(&format!("{base}/v1"), SelectionMode::Random);

        let candidates = source.list_candidates(QueryPurpose::AutoApply).await.unwrap();

        assert!(candidates.is_empty());
        let requests = server.await.unwrap();
        assert!(requests[0].line.starts_with("GET /v1/mediaItems?pageSize=100 "));
        assert!(requests[0].headers.contains("authorization: bearer access"));
    }

    #[tokio::test]
    async fn test_category_search_lists_usable_items() {
        let (base, server) = stub::serve(vec![(
            200,
            r#"{"mediaItems":[{"id":"a","baseUrl":"https://lh3/a","mimeType":"image/jpeg"},{"id":"b","mimeType":"video/mp4","baseUrl":"https://lh3/b"}]}"#,
        )])
        .await;
        let mut source = source_at(&format!("{base}/v1"), SelectionMode::ByCategory);
        source.categories = split_ids("PETS");

        let candidates = source.list_candidates(QueryPurpose::Browse).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "a");
        let requests = server.await.unwrap();
        assert!(requests[0].line.starts_with("POST /v1/mediaItems:search "));
        assert!(requests[0].body.contains("PETS"));
    }

    #[tokio::test]
    async fn test_lookup_escapes_the_id() {
        let (base, server) = stub::serve(vec![(200, r#"{"id":"a/b c","baseUrl":"https://lh3/x"}"#)]).await;
        let source = source_at(&format!("{base}/v1"), SelectionMode::Random);

        let location = source.locate_by_id("a/b c", Quality::Original).await.unwrap();

        assert_eq!(location, ImageLocation::Remote("https://lh3/x=w2500-h2500".into()));
        let requests = server.await.unwrap();
        assert!(requests[0].line.starts_with("GET /v1/mediaItems/a%2Fb%20c "));
    }

    #[test]
    fn test_media_item_url_keeps_id_in_one_segment() {
        let source = source_at(API_BASE, SelectionMode::Random);
        let url = source.media_item_url("x?y#z").unwrap();
        assert_eq!(url.as_str(), "https://photoslibrary.googleapis.com/v1/mediaItems/x%3Fy%23z");
    }

    #[test]
    fn test_category_search_body() {
        let query = plan_query(SelectionMode::ByCategory, &split_ids("LANDSCAPES, PETS"), None);
        let GoogleQuery::Search(body) = query else {
            panic!("expected a search");
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            serde_json::json!({
                "filters": {"contentFilter": {"includedContentCategories": ["LANDSCAPES", "PETS"]}},
                "pageSize": 100
            })
        );
    }

    #[test]
    fn test_album_search_body() {
        let GoogleQuery::Search(body) = plan_query(SelectionMode::ByAlbum, &[], Some("AF1Qip")) else {
            panic!("expected a search");
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            serde_json::json!({"albumId": "AF1Qip", "pageSize": 100})
        );
    }

    #[test]
    fn test_empty_scope_falls_back_to_listing() {
        assert_eq!(plan_query(SelectionMode::ByCategory, &[], None), GoogleQuery::ListAll);
        assert_eq!(plan_query(SelectionMode::ByAlbum, &[], None), GoogleQuery::ListAll);
        assert_eq!(plan_query(SelectionMode::Random, &split_ids("PETS"), Some("a")), GoogleQuery::ListAll);
    }

    #[test]
    fn test_response_without_items() {
        let response: MediaItemsResponse = serde_json::from_str("{}").unwrap();
        assert!(response.media_items.is_empty());
    }

    #[test]
    fn test_unusable_items_are_dropped() {
        let body = r#"{
            "mediaItems": [
                {"id": "a", "baseUrl": "https://lh3.googleusercontent.com/a", "mimeType": "image/jpeg", "filename": "a.jpg"},
                {"id": "b", "baseUrl": "https://lh3.googleusercontent.com/b", "mimeType": "video/mp4"},
                {"id": "c"}
            ],
            "nextPageToken": "next"
        }"#;
        let response: MediaItemsResponse = serde_json::from_str(body).unwrap();
        let candidates = to_candidates(response.media_items);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "a");
    }

    #[test]
    fn test_sized_urls() {
        let item = MediaItem {
            id: "a".into(),
            base_url: Some("https://lh3.googleusercontent.com/a".into()),
            mime_type: None,
        };
        assert_eq!(
            item.sized_url(Quality::Thumbnail).unwrap(),
            "https://lh3.googleusercontent.com/a=w500-h500"
        );
        assert_eq!(
            item.sized_url(Quality::Original).unwrap(),
            "https://lh3.googleusercontent.com/a=w2500-h2500"
        );
    }
}
