use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::Deserialize;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    models::{MovieView, SourcesResponse},
};

#[derive(Debug, Deserialize)]
pub struct MovieQuery {
    lang: Option<String>,
}

pub async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<MovieQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<MovieView>> {
    if id <= 0 {
        return Err(ApiError::BadRequest("movie id must be positive".to_string()));
    }

    let lang = requested_language(query.lang.as_deref(), &headers, &state.config.default_language);
    let view = state.movies.get_movie(id, &lang).await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct SourcesQuery {
    region: Option<String>,
}

pub async fn get_sources(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<SourcesQuery>,
) -> ApiResult<Json<SourcesResponse>> {
    if id <= 0 {
        return Err(ApiError::BadRequest("movie id must be positive".to_string()));
    }

    let region = query.region.as_deref().unwrap_or("US").trim().to_uppercase();
    if region.len() != 2 || !region.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::BadRequest("region must be a 2-letter code".to_string()));
    }

    let sources = state.sources.get_sources(id, &region).await?;
    if sources.is_empty() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(SourcesResponse { sources }))
}

/// Language selection: explicit `lang` query parameter, then the first
/// `Accept-Language` entry, then the configured default.
fn requested_language(query: Option<&str>, headers: &HeaderMap, default: &str) -> String {
    if let Some(tag) = query.map(str::trim) {
        if looks_like_language_tag(tag) {
            return tag.to_string();
        }
    }

    if let Some(tag) = headers
        .get(axum::http::header::ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok())
        .and_then(first_accept_language)
    {
        return tag;
    }

    default.to_string()
}

fn first_accept_language(header: &str) -> Option<String> {
    let first = header.split(',').next()?;
    let tag = first.split(';').next()?.trim();
    looks_like_language_tag(tag).then(|| tag.to_string())
}

fn looks_like_language_tag(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let Some(primary) = parts.next() else {
        return false;
    };
    (2..=3).contains(&primary.len())
        && primary.chars().all(|c| c.is_ascii_alphabetic())
        && parts.all(|part| {
            !part.is_empty() && part.len() <= 8 && part.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

#[cfg(test)]
mod tests {
    use axum::http::header::ACCEPT_LANGUAGE;

    use super::*;

    #[test]
    fn query_parameter_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, "de-DE,de;q=0.9".parse().unwrap());
        assert_eq!(requested_language(Some("fr-FR"), &headers, "en-US"), "fr-FR");
    }

    #[test]
    fn accept_language_header_is_second() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, "de-DE,de;q=0.9".parse().unwrap());
        assert_eq!(requested_language(None, &headers, "en-US"), "de-DE");
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(requested_language(None, &HeaderMap::new(), "en-US"), "en-US");
        assert_eq!(requested_language(Some("not a tag!"), &HeaderMap::new(), "en-US"), "en-US");
    }

    #[test]
    fn language_tag_shapes() {
        assert!(looks_like_language_tag("en"));
        assert!(looks_like_language_tag("en-US"));
        assert!(looks_like_language_tag("zh-Hant-TW"));
        assert!(!looks_like_language_tag(""));
        assert!(!looks_like_language_tag("e"));
        assert!(!looks_like_language_tag("en-"));
        assert!(!looks_like_language_tag("en US"));
    }
}
