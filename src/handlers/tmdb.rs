//! TMDB catalog proxy handlers.
//!
//! - GET /api/tmdb/search?query=&type=multi|movie|tv&page=
//! - GET /api/tmdb/discover?type=movie|tv&genre=&page=
//! - GET /api/tmdb/trending?type=movie|tv
//! - GET /api/tmdb/{kind}/{id}
//! - GET /api/tmdb/{kind}/{id}/credits
//! - GET /api/tmdb/{kind}/{id}/providers?region=

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::{
    error::AppError,
    services::{
        UpstreamError,
        tmdb::{CatalogDetails, CatalogPage, Credits, MediaKind, TmdbClient, WatchProviders},
    },
};

const DEFAULT_REGION: &str = "SA";

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub genre: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProvidersQuery {
    pub region: Option<String>,
}

/// Search movies and series.
///
/// `type` defaults to `multi` (both); people are filtered out of the results.
///
/// # Response (200)
///
/// ```json
/// {
///   "page": 1,
///   "total_pages": 3,
///   "total_results": 52,
///   "results": [{ "id": 603, "media_type": "movie", "title": "The Matrix", ... }]
/// }
/// ```
pub async fn search(
    State(tmdb): State<TmdbClient>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<CatalogPage>, AppError> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidRequest("نص البحث مطلوب".to_string()));
    }

    let kind = match params.kind.as_deref() {
        None | Some("multi") => None,
        Some(other) => Some(parse_kind(other)?),
    };

    let page = tmdb.search(kind, query, params.page.unwrap_or(1)).await?;
    Ok(Json(page))
}

/// Popular titles, optionally by genre id. `type` defaults to `movie`.
pub async fn discover(
    State(tmdb): State<TmdbClient>,
    Query(params): Query<DiscoverQuery>,
) -> Result<Json<CatalogPage>, AppError> {
    let kind = parse_kind_or_movie(params.kind.as_deref())?;
    let page = tmdb
        .discover(kind, params.genre.as_deref(), params.page.unwrap_or(1))
        .await?;
    Ok(Json(page))
}

/// This week's trending titles, in shuffled order.
pub async fn trending(
    State(tmdb): State<TmdbClient>,
    Query(params): Query<TrendingQuery>,
) -> Result<Json<CatalogPage>, AppError> {
    let kind = parse_kind_or_movie(params.kind.as_deref())?;
    let page = tmdb.trending(kind).await?;
    Ok(Json(page))
}

pub async fn details(
    State(tmdb): State<TmdbClient>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<CatalogDetails>, AppError> {
    let details = tmdb
        .details(parse_kind(&kind)?, id)
        .await
        .map_err(title_lookup)?;
    Ok(Json(details))
}

pub async fn credits(
    State(tmdb): State<TmdbClient>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<Credits>, AppError> {
    let credits = tmdb
        .credits(parse_kind(&kind)?, id)
        .await
        .map_err(title_lookup)?;
    Ok(Json(credits))
}

/// Where a title streams in one region (default `SA`).
pub async fn providers(
    State(tmdb): State<TmdbClient>,
    Path((kind, id)): Path<(String, i64)>,
    Query(params): Query<ProvidersQuery>,
) -> Result<Json<WatchProviders>, AppError> {
    let region = params.region.as_deref().unwrap_or(DEFAULT_REGION);
    if region.len() != 2 || !region.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::InvalidRequest("رمز المنطقة غير صالح".to_string()));
    }

    let providers = tmdb
        .providers(parse_kind(&kind)?, id, region)
        .await
        .map_err(title_lookup)?;
    Ok(Json(providers))
}

/// TMDB 404 for a title id becomes our 404; other failures stay 502.
fn title_lookup(err: UpstreamError) -> AppError {
    if err.is_not_found() {
        AppError::NotFound("العنوان غير موجود")
    } else {
        AppError::Upstream(err)
    }
}

fn parse_kind(raw: &str) -> Result<MediaKind, AppError> {
    raw.parse()
        .map_err(|_| AppError::InvalidRequest(format!("نوع المحتوى غير معروف: {raw}")))
}

fn parse_kind_or_movie(raw: Option<&str>) -> Result<MediaKind, AppError> {
    raw.map_or(Ok(MediaKind::Movie), parse_kind)
}
