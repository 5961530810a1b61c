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
    models::{MovieSource, SourceKind},
    upstream::{RetryPolicy, classify_status, send_with_retry},
};

/// Streaming-availability lookups. Title resolution and the offer list are
/// separate calls so the id mapping can be cached on its own.
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    /// Resolve an external catalog id to the provider's own title id.
    /// `Ok(None)` means the provider does not know the title (yet).
    async fn resolve_title(&self, external_id: i64) -> Result<Option<i64>, ProviderError>;

    async fn sources(
        &self,
        title_id: i64,
        region: &str,
    ) -> Result<Vec<MovieSource>, ProviderError>;
}

pub struct WatchmodeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl WatchmodeClient {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        rps: u32,
        retry: RetryPolicy,
    ) -> Self {
        if api_key.trim().is_empty() {
            tracing::warn!("no WATCHMODE_API_KEY provided, source requests will be rejected");
        }

        let limiter =
            Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::new(rps.max(1)).unwrap())));
        Self { client, api_key, base_url, retry, limiter }
    }
}

#[async_trait]
impl StreamingProvider for WatchmodeClient {
    async fn resolve_title(&self, external_id: i64) -> Result<Option<i64>, ProviderError> {
        self.limiter.until_ready().await;

        let url = format!("{}/search/", self.base_url.trim_end_matches('/'));
        let external_id = external_id.to_string();
        let request = self.client.get(url).query(&[
            ("apiKey", self.api_key.as_str()),
            ("search_field", "tmdb_movie_id"),
            ("search_value", external_id.as_str()),
        ]);

        let response = send_with_retry(request, self.retry).await?;
        classify_status(response.status())?;

        let search: SearchResponse = response.json().await?;
        Ok(search.title_results.into_iter().next().map(|title| title.id))
    }

    async fn sources(
        &self,
        title_id: i64,
        region: &str,
    ) -> Result<Vec<MovieSource>, ProviderError> {
        self.limiter.until_ready().await;

        let url = format!("{}/title/{}/sources/", self.base_url.trim_end_matches('/'), title_id);
        let request = self
            .client
            .get(url)
            .query(&[("apiKey", self.api_key.as_str()), ("regions", region)]);

        let response = send_with_retry(request, self.retry).await?;
        classify_status(response.status())?;

        let offers: Vec<SourceOffer> = response.json().await?;
        Ok(offers.into_iter().filter_map(map_offer).collect())
    }
}

fn map_offer(offer: SourceOffer) -> Option<MovieSource> {
    // Offer kinds we do not model (e.g. "tve" cable logins) are skipped.
    let kind = SourceKind::from_watchmode_code(&offer.kind)?;
    Some(MovieSource {
        provider_name: offer.name,
        kind,
        url: offer.web_url,
        quality: offer.format,
        price: offer.price,
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    title_results: Vec<TitleResult>,
}

#[derive(Debug, Deserialize)]
struct TitleResult {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct SourceOffer {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    web_url: String,
    format: String,
    price: Option<f64>,
}
