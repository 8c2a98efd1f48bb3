//! Read-only TMDB proxy with response reshaping and an in-memory cache.
//!
//! Raw TMDB JSON is cached per path + query in a `moka` cache; reshaping runs
//! on every call so cached entries stay independent of the output format.

use std::{fmt, str::FromStr, time::Duration};

use moka::future::Cache;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Value;

use super::UpstreamError;

const SERVICE: &str = "tmdb";
const CACHE_CAPACITY: u64 = 1_000;
/// TMDB refuses pages past this.
const MAX_PAGE: u32 = 500;
const MAX_CAST: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaKind::Movie),
            "tv" => Ok(MediaKind::Tv),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

/// One movie or series in a listing.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CatalogItem {
    pub id: i64,
    pub media_type: String,
    pub title: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
    pub results: Vec<CatalogItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogDetails {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub genres: Vec<String>,
    pub tagline: Option<String>,
    pub runtime_minutes: Option<i64>,
    pub number_of_seasons: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CastMember {
    pub id: i64,
    pub name: String,
    pub character: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credits {
    pub cast: Vec<CastMember>,
    pub directors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchProviders {
    pub region: String,
    pub link: Option<String>,
    pub flatrate: Vec<Provider>,
    pub rent: Vec<Provider>,
    pub buy: Vec<Provider>,
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    http: reqwest::Client,
    base_url: String,
    image_base_url: String,
    api_key: String,
    language: String,
    cache: Cache<String, Value>,
}

impl TmdbClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        image_base_url: &str,
        api_key: &str,
        language: &str,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            image_base_url: image_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            language: language.to_string(),
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(cache_ttl)
                .build(),
        }
    }

    /// Search movies, series, or both when `kind` is `None`.
    pub async fn search(
        &self,
        kind: Option<MediaKind>,
        query: &str,
        page: u32,
    ) -> Result<CatalogPage, UpstreamError> {
        let segment = kind.map_or("multi", MediaKind::as_str);
        let raw = self
            .get(
                &format!("/search/{segment}"),
                &[
                    ("query", query.to_string()),
                    ("page", clamp_page(page).to_string()),
                    ("include_adult", "false".to_string()),
                ],
            )
            .await?;
        Ok(self.page_from(&raw, kind))
    }

    pub async fn discover(
        &self,
        kind: MediaKind,
        genre: Option<&str>,
        page: u32,
    ) -> Result<CatalogPage, UpstreamError> {
        let mut params = vec![
            ("page", clamp_page(page).to_string()),
            ("sort_by", "popularity.desc".to_string()),
        ];
        if let Some(genre) = genre {
            params.push(("with_genres", genre.to_string()));
        }
        let raw = self
            .get(&format!("/discover/{kind}"), &params)
            .await?;
        Ok(self.page_from(&raw, Some(kind)))
    }

    /// This week's trending titles in random order.
    pub async fn trending(&self, kind: MediaKind) -> Result<CatalogPage, UpstreamError> {
        let raw = self.get(&format!("/trending/{kind}/week"), &[]).await?;
        let mut page = self.page_from(&raw, Some(kind));
        page.results.shuffle(&mut rand::rng());
        Ok(page)
    }

    pub async fn details(&self, kind: MediaKind, id: i64) -> Result<CatalogDetails, UpstreamError> {
        let raw = self.get(&format!("/{kind}/{id}"), &[]).await?;
        let item = self
            .item_from(&raw, Some(kind))
            .ok_or_else(|| decode_error("details without id"))?;

        let genres = raw["genres"]
            .as_array()
            .map(|g| {
                g.iter()
                    .filter_map(|g| g["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let runtime_minutes = raw["runtime"].as_i64().or_else(|| {
            raw["episode_run_time"]
                .as_array()
                .and_then(|r| r.first())
                .and_then(Value::as_i64)
        });

        Ok(CatalogDetails {
            item,
            genres,
            tagline: non_empty(&raw["tagline"]),
            runtime_minutes,
            number_of_seasons: raw["number_of_seasons"].as_i64(),
        })
    }

    pub async fn credits(&self, kind: MediaKind, id: i64) -> Result<Credits, UpstreamError> {
        let raw = self.get(&format!("/{kind}/{id}/credits"), &[]).await?;

        let cast = raw["cast"]
            .as_array()
            .map(|cast| {
                cast.iter()
                    .filter_map(|c| {
                        Some(CastMember {
                            id: c["id"].as_i64()?,
                            name: c["name"].as_str()?.to_string(),
                            character: non_empty(&c["character"]),
                            profile_url: self.image(&c["profile_path"]),
                        })
                    })
                    .take(MAX_CAST)
                    .collect()
            })
            .unwrap_or_default();

        let directors = raw["crew"]
            .as_array()
            .map(|crew| {
                crew.iter()
                    .filter(|c| c["job"] == "Director")
                    .filter_map(|c| c["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Credits { cast, directors })
    }

    /// Where to watch a title in `region` (ISO 3166-1, e.g. `SA`).
    pub async fn providers(
        &self,
        kind: MediaKind,
        id: i64,
        region: &str,
    ) -> Result<WatchProviders, UpstreamError> {
        let raw = self.get(&format!("/{kind}/{id}/watch/providers"), &[]).await?;
        let region = region.to_uppercase();
        let entry = &raw["results"][region.as_str()];

        let list = |key: &str| -> Vec<Provider> {
            entry[key]
                .as_array()
                .map(|ps| {
                    ps.iter()
                        .filter_map(|p| {
                            Some(Provider {
                                id: p["provider_id"].as_i64()?,
                                name: p["provider_name"].as_str()?.to_string(),
                                logo_url: self.image(&p["logo_path"]),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(WatchProviders {
            link: non_empty(&entry["link"]),
            flatrate: list("flatrate"),
            rent: list("rent"),
            buy: list("buy"),
            region,
        })
    }

    /// GET a TMDB path through the cache.
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, UpstreamError> {
        let key = cache_key(path, params);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::trace!(key = %key, "tmdb cache hit");
            return Ok(hit);
        }

        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(&[("api_key", self.api_key.as_str()), ("language", self.language.as_str())])
            .query(params)
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;
        let response = UpstreamError::check(SERVICE, response).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| decode_error(&e.to_string()))?;

        self.cache.insert(key, value.clone()).await;
        Ok(value)
    }

    fn page_from(&self, raw: &Value, kind: Option<MediaKind>) -> CatalogPage {
        let results = raw["results"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| self.item_from(v, kind)).collect())
            .unwrap_or_default();

        CatalogPage {
            page: as_u32(&raw["page"]).max(1),
            total_pages: as_u32(&raw["total_pages"]),
            total_results: as_u32(&raw["total_results"]),
            results,
        }
    }

    /// Reshape one TMDB result. People and entries without an id are skipped.
    fn item_from(&self, v: &Value, kind: Option<MediaKind>) -> Option<CatalogItem> {
        let media_type = match (v["media_type"].as_str(), kind) {
            (Some("movie"), _) => "movie",
            (Some("tv"), _) => "tv",
            (Some(_), _) => return None,
            (None, Some(kind)) => kind.as_str(),
            (None, None) => return None,
        };

        let title = v["title"]
            .as_str()
            .or_else(|| v["name"].as_str())
            .unwrap_or_default()
            .to_string();

        let release_date = non_empty(&v["release_date"]).or_else(|| non_empty(&v["first_air_date"]));

        Some(CatalogItem {
            id: v["id"].as_i64()?,
            media_type: media_type.to_string(),
            title,
            overview: v["overview"].as_str().unwrap_or_default().to_string(),
            poster_url: self.image(&v["poster_path"]),
            backdrop_url: self.image(&v["backdrop_path"]),
            release_date,
            vote_average: v["vote_average"].as_f64().unwrap_or(0.0),
        })
    }

    fn image(&self, path: &Value) -> Option<String> {
        non_empty(path).map(|p| format!("{}{}", self.image_base_url, p))
    }
}

fn cache_key(path: &str, params: &[(&str, String)]) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort();
    let query: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{path}?{}", query.join("&"))
}

fn clamp_page(page: u32) -> u32 {
    page.clamp(1, MAX_PAGE)
}

fn as_u32(v: &Value) -> u32 {
    v.as_u64().map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

fn non_empty(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn decode_error(message: &str) -> UpstreamError {
    UpstreamError::Decode {
        service: SERVICE,
        message: message.to_string(),
    }
}
