use std::{num::NonZeroU32, sync::Arc};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::Deserialize;

use crate::{
    error::ProviderError,
    models::ExternalMovie,
    upstream::{RetryPolicy, classify_status, send_with_retry},
};

/// Upstream catalog lookup for one (movie, language) pair.
#[async_trait]
pub trait MovieProvider: Send + Sync {
    async fn movie_details(
        &self,
        external_id: i64,
        lang: &str,
    ) -> Result<ExternalMovie, ProviderError>;
}

pub struct TmdbClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
    default_language: String,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl TmdbClient {
    pub fn new(
        client: reqwest::Client,
        access_token: String,
        base_url: String,
        default_language: String,
        rps: u32,
        retry: RetryPolicy,
    ) -> Self {
        if access_token.trim().is_empty() {
            tracing::warn!("no TMDB_ACCESS_TOKEN provided, catalog requests will be rejected");
        }

        let limiter =
            Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::new(rps.max(1)).unwrap())));
        Self { client, access_token, base_url, default_language, retry, limiter }
    }

    async fn fetch_one(&self, external_id: i64, lang: &str) -> Result<TmdbMovie, ProviderError> {
        self.limiter.until_ready().await;

        let url = format!("{}/movie/{}", self.base_url.trim_end_matches('/'), external_id);
        let request = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("language", lang), ("append_to_response", "videos")]);

        let response = send_with_retry(request, self.retry).await?;
        classify_status(response.status())?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MovieProvider for TmdbClient {
    async fn movie_details(
        &self,
        external_id: i64,
        lang: &str,
    ) -> Result<ExternalMovie, ProviderError> {
        let mut movie = map_movie(self.fetch_one(external_id, lang).await?)?;

        // Non-default catalog entries are frequently missing the overview or
        // trailer; fill the gaps from the default language without touching
        // fields the primary response already provided.
        if needs_fallback(&movie) && lang != self.default_language {
            match self.fetch_one(external_id, &self.default_language).await {
                Ok(raw) => {
                    if let Ok(fallback) = map_movie(raw) {
                        apply_fallback(&mut movie, fallback);
                    }
                },
                Err(err) => {
                    tracing::debug!(
                        external_id,
                        lang = %self.default_language,
                        error = %err,
                        "default-language fallback fetch failed"
                    );
                },
            }
        }

        Ok(movie)
    }
}

fn needs_fallback(movie: &ExternalMovie) -> bool {
    movie.overview.as_deref().is_none_or(|overview| overview.trim().is_empty())
        || movie.trailer_url.is_none()
}

fn apply_fallback(movie: &mut ExternalMovie, fallback: ExternalMovie) {
    if movie.overview.as_deref().is_none_or(|overview| overview.trim().is_empty()) {
        movie.overview = fallback.overview;
    }
    if movie.trailer_url.is_none() {
        movie.trailer_url = fallback.trailer_url;
    }
}

fn map_movie(raw: TmdbMovie) -> Result<ExternalMovie, ProviderError> {
    let release_date = raw
        .release_date
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|_| ProviderError::Upstream(format!("malformed release date for {}", raw.id)))?;

    let trailer_url = raw.videos.and_then(|videos| {
        videos
            .results
            .into_iter()
            .find(|video| video.kind == "Trailer" && video.site == "YouTube")
            .map(|video| format!("https://www.youtube.com/watch?v={}", video.key))
    });

    Ok(ExternalMovie {
        external_id: raw.id,
        title: raw.title,
        overview: raw.overview.filter(|overview| !overview.trim().is_empty()),
        poster_path: raw.poster_path,
        backdrop_path: raw.backdrop_path,
        release_date,
        trailer_url,
    })
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    id: i64,
    title: String,
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    release_date: Option<String>,
    videos: Option<TmdbVideos>,
}

#[derive(Debug, Deserialize)]
struct TmdbVideos {
    results: Vec<TmdbVideo>,
}

#[derive(Debug, Deserialize)]
struct TmdbVideo {
    key: String,
    site: String,
    #[serde(rename = "type")]
    kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> TmdbMovie {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn maps_payload_with_trailer() {
        let movie = map_movie(raw(
            r#"{
                "id": 550,
                "title": "Fight Club",
                "overview": "An insomniac...",
                "poster_path": "/poster.jpg",
                "backdrop_path": "/backdrop.jpg",
                "release_date": "1999-10-15",
                "videos": {"results": [
                    {"key": "abc", "site": "Vimeo", "type": "Trailer"},
                    {"key": "xyz", "site": "YouTube", "type": "Teaser"},
                    {"key": "qGl45EHlDlQ", "site": "YouTube", "type": "Trailer"}
                ]}
            }"#,
        ))
        .unwrap();

        assert_eq!(movie.external_id, 550);
        assert_eq!(movie.release_date.year(), 1999);
        assert_eq!(
            movie.trailer_url.as_deref(),
            Some("https://www.youtube.com/watch?v=qGl45EHlDlQ")
        );
    }

    #[test]
    fn blank_overview_becomes_none() {
        let movie = map_movie(raw(
            r#"{"id": 1, "title": "T", "overview": "  ", "release_date": "2020-01-01"}"#,
        ))
        .unwrap();
        assert_eq!(movie.overview, None);
    }

    #[test]
    fn missing_release_date_is_an_upstream_error() {
        let result = map_movie(raw(r#"{"id": 1, "title": "T"}"#));
        assert!(matches!(result, Err(ProviderError::Upstream(_))));
    }

    #[test]
    fn fallback_fills_only_missing_fields() {
        let mut movie = map_movie(raw(
            r#"{"id": 1, "title": "Der Titel", "overview": "", "release_date": "2020-01-01"}"#,
        ))
        .unwrap();
        assert!(needs_fallback(&movie));

        let fallback = map_movie(raw(
            r#"{
                "id": 1,
                "title": "The Title",
                "overview": "An overview.",
                "release_date": "2020-01-01",
                "videos": {"results": [{"key": "k", "site": "YouTube", "type": "Trailer"}]}
            }"#,
        ))
        .unwrap();

        apply_fallback(&mut movie, fallback);
        assert_eq!(movie.title, "Der Titel");
        assert_eq!(movie.overview.as_deref(), Some("An overview."));
        assert_eq!(movie.trailer_url.as_deref(), Some("https://www.youtube.com/watch?v=k"));
    }

    #[test]
    fn fallback_never_overwrites_present_fields() {
        let mut movie = map_movie(raw(
            r#"{
                "id": 1,
                "title": "Der Titel",
                "overview": "Eine Beschreibung.",
                "release_date": "2020-01-01",
                "videos": {"results": [{"key": "de", "site": "YouTube", "type": "Trailer"}]}
            }"#,
        ))
        .unwrap();
        assert!(!needs_fallback(&movie));

        let fallback = map_movie(raw(
            r#"{
                "id": 1,
                "title": "The Title",
                "overview": "An overview.",
                "release_date": "2020-01-01",
                "videos": {"results": [{"key": "en", "site": "YouTube", "type": "Trailer"}]}
            }"#,
        ))
        .unwrap();

        apply_fallback(&mut movie, fallback);
        assert_eq!(movie.overview.as_deref(), Some("Eine Beschreibung."));
        assert_eq!(movie.trailer_url.as_deref(), Some("https://www.youtube.com/watch?v=de"));
    }
}
