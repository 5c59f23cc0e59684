//! # Immich Provider
//!
//! Talks to a self-hosted Immich server with a static API key.
//!
//! ## Queries per mode
//! - ByCategory: one `POST /api/search/metadata` per configured id, by person or,
//!   for `tag:`-prefixed entries, by tag. Results are unioned.
//! - ByAlbum: `GET /api/albums/{id}`
//! - Random: one metadata search over image assets
//!
//! Images are served from `/api/assets/{id}/thumbnail` and `/api/assets/{id}/original`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    read_location, union_results, Candidate, CandidatePayload, ImageLocation, PhotoSource, Quality,
    QueryPurpose,
};
use crate::config::{Config, SelectionMode};
use crate::endpoint::{resolve_endpoint, PingProbe};
use crate::error::PipelineError;
use crate::http::{create_client, Auth};

/// Prefix marking a tag id in the person id list.
pub const TAG_PREFIX: &str = "tag:";

/// Body of `POST /api/search/metadata`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSearch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<String>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    pub with_archived: bool,
    pub size: u32,
}

impl MetadataSearch {
    fn base(size: u32) -> Self {
        Self {
            person_ids: None,
            tag_ids: None,
            asset_type: None,
            with_archived: false,
            size,
        }
    }

    pub fn person(id: &str, size: u32) -> Self {
        Self {
            person_ids: Some(vec![id.to_string()]),
            ..Self::base(size)
        }
    }

    pub fn tag(id: &str, size: u32) -> Self {
        Self {
            tag_ids: Some(vec![id.to_string()]),
            ..Self::base(size)
        }
    }

    pub fn images(size: u32) -> Self {
        Self {
            asset_type: Some("IMAGE".to_string()),
            ..Self::base(size)
        }
    }
}

/// A request the provider will issue.
#[derive(Debug, Clone, PartialEq)]
pub enum ImmichQuery {
    Search(MetadataSearch),
    Album(String),
}

/// Response of `POST /api/search/metadata`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub assets: SearchAssets,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAssets {
    #[serde(default)]
    pub items: Vec<Asset>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Response of `GET /api/albums/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumResponse {
    #[serde(default)]
    pub album_name: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// An asset as returned inside search and album responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    #[serde(rename = "type", default)]
    pub asset_type: Option<String>,
}

impl Asset {
    fn is_video(&self) -> bool {
        self.asset_type.as_deref() == Some("VIDEO")
    }
}

/// Plans the requests for a mode. Empty ids, including a bare `tag:`, plan nothing.
pub fn plan_queries(mode: SelectionMode, category_ids: &[String], album_id: Option<&str>, size: u32) -> Vec<ImmichQuery> {
    match mode {
        SelectionMode::ByCategory => category_ids
            .iter()
            .filter_map(|id| match id.strip_prefix(TAG_PREFIX).map(str::trim) {
                Some("") => None,
                Some(tag) => Some(ImmichQuery::Search(MetadataSearch::tag(tag, size))),
                None => Some(ImmichQuery::Search(MetadataSearch::person(id, size))),
            })
            .collect(),
        SelectionMode::ByAlbum => album_id
            .map(|id| vec![ImmichQuery::Album(id.to_string())])
            .unwrap_or_default(),
        SelectionMode::Random => vec![ImmichQuery::Search(MetadataSearch::images(size))],
    }
}

fn to_candidates(assets: Vec<Asset>) -> Vec<Candidate> {
    assets
        .into_iter()
        .filter(|a| !a.is_video())
        .map(|asset| Candidate {
            id: asset.id.clone(),
            payload: CandidatePayload::Immich(asset),
        })
        .collect()
}

/// An authenticated Immich session.
pub struct ImmichSource {
    client: reqwest::Client,
    endpoint: String,
    mode: SelectionMode,
    category_ids: Vec<String>,
    album_id: Option<String>,
}

impl ImmichSource {
    /// Builds the keyed client and picks the reachable endpoint.
    pub async fn connect(config: &Config) -> Result<Self, PipelineError> {
        let (client, endpoint) = connect_client(config).await?;
        Ok(Self {
            client,
            endpoint,
            mode: config.mode,
            category_ids: config.category_ids(),
            album_id: config.album_id().map(str::to_string),
        })
    }

    pub fn asset_url(&self, id: &str, quality: Quality) -> String {
        asset_url(&self.endpoint, id, quality)
    }

    /// Runs one query. `Ok(None)` means the server rejected it.
    async fn run(&self, query: &ImmichQuery) -> Result<Option<Vec<Asset>>, PipelineError> {
        let response = match query {
            ImmichQuery::Search(body) => {
                self.client
                    .post(format!("{}/api/search/metadata", self.endpoint))
                    .json(body)
                    .send()
                    .await?
            }
            ImmichQuery::Album(id) => {
                self.client
                    .get(format!("{}/api/albums/{id}", self.endpoint))
                    .send()
                    .await?
            }
        };

        if !response.status().is_success() {
            warn!("Immich query {query:?} returned HTTP {}", response.status());
            return Ok(None);
        }

        let body = response.text().await?;
        let assets = match query {
            ImmichQuery::Search(_) => {
                let found = serde_json::from_str::<SearchResponse>(&body)?.assets;
                debug!("Search matched {} asset(s)", found.total.unwrap_or(found.items.len() as u64));
                found.items
            }
            ImmichQuery::Album(_) => {
                let album = serde_json::from_str::<AlbumResponse>(&body)?;
                debug!("Album {} holds {} asset(s)", album.album_name.as_deref().unwrap_or("?"), album.assets.len());
                album.assets
            }
        };
        Ok(Some(assets))
    }
}

/// Keyed client plus resolved endpoint, shared with discovery.
pub(crate) async fn connect_client(config: &Config) -> Result<(reqwest::Client, String), PipelineError> {
    let client = create_client(&Auth::ApiKey(config.api_key.clone()))?;
    let endpoint = resolve_endpoint(&PingProbe::new(&client), &config.base_url, &config.fallback_base_url).await;
    Ok((client, endpoint))
}

pub fn asset_url(endpoint: &str, id: &str, quality: Quality) -> String {
    let kind = match quality {
        Quality::Thumbnail => "thumbnail",
        Quality::Original => "original",
    };
    format!("{endpoint}/api/assets/{id}/{kind}")
}

#[async_trait]
impl PhotoSource for ImmichSource {
    fn name(&self) -> &'static str {
        "Immich"
    }

    async fn list_candidates(&self, purpose: QueryPurpose) -> Result<Vec<Candidate>, PipelineError> {
        let queries = plan_queries(self.mode, &self.category_ids, self.album_id.as_deref(), purpose.size_cap());
        if queries.is_empty() {
            info!("No Immich ids configured for {:?} mode", self.mode);
            return Ok(Vec::new());
        }

        let mut outcomes = Vec::with_capacity(queries.len());
        for query in &queries {
            outcomes.push(self.run(query).await);
        }

        let candidates = to_candidates(union_results(outcomes)?);
        debug!("{} Immich candidate(s) from {} quer(ies)", candidates.len(), queries.len());
        Ok(candidates)
    }

    fn locate(&self, candidate: &Candidate, quality: Quality) -> Result<ImageLocation, PipelineError> {
        let id = match &candidate.payload {
            CandidatePayload::Immich(asset) => asset.id.as_str(),
            _ => candidate.id.as_str(),
        };
        Ok(ImageLocation::Remote(self.asset_url(id, quality)))
    }

    async fn locate_by_id(&self, id: &str, quality: Quality) -> Result<ImageLocation, PipelineError> {
        Ok(ImageLocation::Remote(self.asset_url(id, quality)))
    }

    async fn fetch(&self, location: &ImageLocation) -> Result<Vec<u8>, PipelineError> {
        read_location(&self.client, location).await
    }
}
