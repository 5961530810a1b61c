use std::sync::Arc;

use tracing::debug;

use crate::{
    cache::{self, HybridCache, ttl},
    error::ApiError,
    models::MovieSource,
    watchmode::StreamingProvider,
};

/// Read path for streaming availability. The provider's title-id mapping is
/// cached on its own, longer-lived key so refreshing a region's offer list
/// never re-resolves the id.
#[derive(Clone)]
pub struct SourceService {
    cache: HybridCache,
    provider: Arc<dyn StreamingProvider>,
}

impl SourceService {
    pub fn new(cache: HybridCache, provider: Arc<dyn StreamingProvider>) -> Self {
        Self { cache, provider }
    }

    pub async fn get_sources(
        &self,
        external_id: i64,
        region: &str,
    ) -> Result<Vec<MovieSource>, ApiError> {
        let key = cache::sources_key(external_id, region);

        let cache = self.cache.clone();
        let provider = self.provider.clone();
        let region_owned = region.to_string();

        let fetched = self
            .cache
            .get_or_try_fetch(&key, ttl::MEDIUM, move || async move {
                let resolved = resolve_title(&cache, provider.clone(), external_id).await?;
                let Some(title_id) = resolved else {
                    // An unmatched title is left uncached on purpose: the
                    // provider may pick it up any day, and a stored negative
                    // would hide that until expiry.
                    debug!(external_id, "no streaming match for movie");
                    return Ok(None);
                };

                let sources = provider.sources(title_id, &region_owned).await?;
                debug!(external_id, region = %region_owned, count = sources.len(), "fetched streaming sources");
                Ok::<_, ApiError>(Some(sources))
            })
            .await?;

        Ok(fetched.unwrap_or_default())
    }
}

/// Cached external-id → provider-title-id mapping. Only successful matches
/// are stored; misses are retried on every call.
async fn resolve_title(
    cache: &HybridCache,
    provider: Arc<dyn StreamingProvider>,
    external_id: i64,
) -> Result<Option<i64>, ApiError> {
    let key = cache::title_id_key(external_id);
    cache
        .get_or_try_fetch(&key, ttl::LONG, move || async move {
            provider.resolve_title(external_id).await.map_err(ApiError::from)
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::Ordering,
        time::Duration,
    };

    use super::*;
    use crate::{
        cache::CacheOptions,
        testutil::{ScriptedStreaming, sample_source},
    };

    fn test_cache() -> HybridCache {
        HybridCache::new(
            CacheOptions {
                memory_ttl: Duration::from_secs(60),
                fail_safe: Duration::from_secs(60),
                soft_timeout: Duration::from_secs(5),
            },
            None,
        )
    }

    #[tokio::test]
    async fn unmatched_title_returns_empty_and_caches_nothing() {
        let provider = Arc::new(ScriptedStreaming::unmatched());
        let service = SourceService::new(test_cache(), provider.clone());

        for _ in 0..2 {
            let sources = service.get_sources(123, "US").await.unwrap();
            assert!(sources.is_empty());
        }

        // Neither the empty list nor the missing id mapping was stored.
        assert_eq!(provider.resolve_calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.source_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn offer_list_is_cached() {
        let provider =
            Arc::new(ScriptedStreaming::with_offers(99, vec![sample_source("Netflix")]));
        let service = SourceService::new(test_cache(), provider.clone());

        for _ in 0..2 {
            let sources = service.get_sources(550, "US").await.unwrap();
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].provider_name, "Netflix");
        }

        assert_eq!(provider.resolve_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.source_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn id_mapping_outlives_the_offer_list() {
        let cache = test_cache();
        let provider =
            Arc::new(ScriptedStreaming::with_offers(99, vec![sample_source("Netflix")]));
        let service = SourceService::new(cache.clone(), provider.clone());

        service.get_sources(550, "US").await.unwrap();

        // Offer list expires; the id mapping must survive the refresh.
        cache.remove(&cache::sources_key(550, "US")).await;
        service.get_sources(550, "US").await.unwrap();

        assert_eq!(provider.resolve_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.source_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn offer_failure_propagates_and_is_retried() {
        let provider = Arc::new(ScriptedStreaming::with_failing_sources(99));
        let service = SourceService::new(test_cache(), provider.clone());

        for _ in 0..2 {
            let result = service.get_sources(550, "US").await;
            assert!(matches!(result, Err(ApiError::Internal(_))));
        }

        assert_eq!(provider.source_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn regions_are_cached_separately() {
        let provider =
            Arc::new(ScriptedStreaming::with_offers(99, vec![sample_source("Netflix")]));
        let service = SourceService::new(test_cache(), provider.clone());

        service.get_sources(550, "US").await.unwrap();
        service.get_sources(550, "GB").await.unwrap();

        assert_eq!(provider.source_calls.load(Ordering::SeqCst), 2);
    }
}
