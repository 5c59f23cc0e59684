//! # Source Discovery
//!
//! Lists the albums, people and tags a user can pick from when filling in
//! the configuration. Returns `(id, name)` pairs; tag ids come back with the
//! `tag:` prefix so they can be pasted straight into the person id list.

use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::{Config, ProviderKind};
use crate::error::PipelineError;
use crate::providers::{google, immich};

/// An album, person or tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedItem {
    pub id: String,
    pub name: String,
}

impl NamedItem {
    fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImmichAlbum {
    id: String,
    #[serde(default)]
    album_name: String,
    #[serde(default)]
    asset_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ImmichPerson {
    id: String,
    #[serde(default)]
    name: String,
}

/// `/api/people` wraps the list; the older `/api/person` returns it bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PeopleResponse {
    Wrapped { people: Vec<ImmichPerson> },
    Bare(Vec<ImmichPerson>),
}

impl PeopleResponse {
    fn into_people(self) -> Vec<ImmichPerson> {
        match self {
            PeopleResponse::Wrapped { people } => people,
            PeopleResponse::Bare(people) => people,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImmichTag {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAlbumsResponse {
    #[serde(default)]
    albums: Vec<GoogleAlbum>,
    #[serde(default)]
    shared_albums: Vec<GoogleAlbum>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAlbum {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    media_items_count: Option<String>,
}

fn album_label(name: &str, count: Option<String>) -> String {
    match count {
        Some(count) => format!("{name} ({count})"),
        None => name.to_string(),
    }
}

fn immich_albums(albums: Vec<ImmichAlbum>) -> Vec<NamedItem> {
    albums
        .into_iter()
        .map(|a| {
            let label = album_label(&a.album_name, a.asset_count.map(|c| c.to_string()));
            NamedItem::new(a.id, label)
        })
        .collect()
}

/// Only named people are useful to pick from.
fn named_people(people: Vec<ImmichPerson>) -> Vec<NamedItem> {
    people
        .into_iter()
        .filter(|p| !p.name.trim().is_empty())
        .map(|p| NamedItem::new(p.id, p.name))
        .collect()
}

fn tag_items(tags: Vec<ImmichTag>) -> Vec<NamedItem> {
    tags.into_iter()
        .map(|t| {
            let name = t.value.filter(|v| !v.is_empty()).unwrap_or(t.name);
            NamedItem::new(format!("{}{}", immich::TAG_PREFIX, t.id), name)
        })
        .collect()
}

fn google_albums(response: GoogleAlbumsResponse) -> Vec<NamedItem> {
    response
        .albums
        .into_iter()
        .chain(response.shared_albums)
        .map(|a| {
            let label = album_label(&a.title, a.media_items_count);
            NamedItem::new(a.id, label)
        })
        .collect()
}

async fn get_json<T: serde::de::DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<Option<T>, PipelineError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        warn!("GET {url} returned HTTP {}", response.status());
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&response.text().await?)?))
}

/// Albums of the configured provider. Local folders have none.
pub async fn list_albums(config: &Config) -> Result<Vec<NamedItem>, PipelineError> {
    config.validate()?;
    match config.provider {
        ProviderKind::Local => Ok(Vec::new()),
        ProviderKind::SelfHosted => {
            let (client, endpoint) = immich::connect_client(config).await?;
            let albums: Vec<ImmichAlbum> = get_json(&client, &format!("{endpoint}/api/albums"))
                .await?
                .unwrap_or_default();
            Ok(immich_albums(albums))
        }
        ProviderKind::CloudPhotos => {
            let client = google::connect_client(config).await?;
            let mut items = Vec::new();
            for path in ["albums", "sharedAlbums"] {
                let url = format!("{}/{path}?pageSize=50", google::API_BASE);
                if let Some(response) = get_json::<GoogleAlbumsResponse>(&client, &url).await? {
                    items.extend(google_albums(response));
                }
            }
            let mut seen = HashSet::new();
            items.retain(|a| seen.insert(a.id.clone()));
            debug!("{} Google Photos album(s)", items.len());
            Ok(items)
        }
    }
}

/// Named people and tags on the Immich server.
pub async fn list_people(config: &Config) -> Result<Vec<NamedItem>, PipelineError> {
    config.validate()?;
    if config.provider != ProviderKind::SelfHosted {
        return Err(PipelineError::Config("people and tags are only available for Immich".into()));
    }

    let (client, endpoint) = immich::connect_client(config).await?;

    let mut people = get_json::<PeopleResponse>(&client, &format!("{endpoint}/api/people")).await?;
    if people.is_none() {
        people = get_json::<PeopleResponse>(&client, &format!("{endpoint}/api/person")).await?;
    }
    let mut items = people.map(|p| named_people(p.into_people())).unwrap_or_default();

    let tags: Vec<ImmichTag> = get_json(&client, &format!("{endpoint}/api/tags"))
        .await?
        .unwrap_or_default();
    items.extend(tag_items(tags));

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_people_response_shapes() {
        let wrapped: PeopleResponse = serde_json::from_str(
            r#"{"total":3,"hidden":0,"people":[{"id":"p1","name":"Ana"},{"id":"p2","name":""},{"id":"p3"}]}"#,
        )
        .unwrap();
        assert_eq!(named_people(wrapped.into_people()), vec![NamedItem::new("p1", "Ana")]);

        let bare: PeopleResponse = serde_json::from_str(r#"[{"id":"p9","name":"Kai"}]"#).unwrap();
        assert_eq!(named_people(bare.into_people()), vec![NamedItem::new("p9", "Kai")]);
    }

    #[test]
    fn test_tags_get_prefix_and_full_value() {
        let tags: Vec<ImmichTag> =
            serde_json::from_str(r#"[{"id":"t1","name":"Beach","value":"Holidays/Beach"},{"id":"t2","name":"Snow"}]"#)
                .unwrap();
        assert_eq!(
            tag_items(tags),
            vec![NamedItem::new("tag:t1", "Holidays/Beach"), NamedItem::new("tag:t2", "Snow")]
        );
    }

    #[test]
    fn test_immich_album_labels() {
        let albums: Vec<ImmichAlbum> =
            serde_json::from_str(r#"[{"id":"a1","albumName":"Trips","assetCount":42},{"id":"a2","albumName":"Empty"}]"#)
                .unwrap();
        assert_eq!(
            immich_albums(albums),
            vec![NamedItem::new("a1", "Trips (42)"), NamedItem::new("a2", "Empty")]
        );
    }

    #[test]
    fn test_google_albums_include_shared() {
        let own: GoogleAlbumsResponse =
            serde_json::from_str(r#"{"albums":[{"id":"g1","title":"Family","mediaItemsCount":"12"}]}"#).unwrap();
        let shared: GoogleAlbumsResponse =
            serde_json::from_str(r#"{"sharedAlbums":[{"id":"g2","title":"Wedding"}],"nextPageToken":"x"}"#).unwrap();

        let mut items = google_albums(own);
        items.extend(google_albums(shared));
        assert_eq!(
            items,
            vec![NamedItem::new("g1", "Family (12)"), NamedItem::new("g2", "Wedding")]
        );
    }

    #[tokio::test]
    async fn test_local_has_no_albums() {
        let config = Config {
            provider: ProviderKind::Local,
            local_folder_path: "/photos".into(),
            ..Config::default()
        };
        assert!(list_albums(&config).await.unwrap().is_empty());
        assert!(matches!(list_people(&config).await, Err(PipelineError::Config(_))));
    }
}
