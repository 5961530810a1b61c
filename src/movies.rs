use std::sync::Arc;

use tracing::debug;

use crate::{
    cache::{self, HybridCache, ttl},
    error::ApiError,
    import::{ImportJob, ImportQueue},
    models::MovieView,
    store::MovieStore,
    tmdb::MovieProvider,
};

/// Read path for localized movie views: cache, then local store, then the
/// upstream catalog. First upstream contact for a movie queues a background
/// import of every supported language.
#[derive(Clone)]
pub struct MovieService {
    cache: HybridCache,
    store: Arc<dyn MovieStore>,
    provider: Arc<dyn MovieProvider>,
    imports: ImportQueue,
}

impl MovieService {
    pub fn new(
        cache: HybridCache,
        store: Arc<dyn MovieStore>,
        provider: Arc<dyn MovieProvider>,
        imports: ImportQueue,
    ) -> Self {
        Self { cache, store, provider, imports }
    }

    pub async fn get_movie(&self, external_id: i64, lang: &str) -> Result<MovieView, ApiError> {
        let key = cache::movie_key(external_id, lang);

        let store = self.store.clone();
        let provider = self.provider.clone();
        let imports = self.imports.clone();
        let lang_owned = lang.to_string();

        let result = self
            .cache
            .get_or_fetch(&key, ttl::MEDIUM, move || async move {
                if let Some(found) = store.find_localized(external_id, &lang_owned).await? {
                    debug!(external_id, lang = %lang_owned, "serving movie from local store");
                    return Ok(found);
                }

                let movie = provider.movie_details(external_id, &lang_owned).await?;
                debug!(external_id, lang = %lang_owned, "movie discovered upstream, queueing import");
                imports.enqueue(ImportJob { external_id });
                Ok::<_, ApiError>(movie.into_view(&lang_owned))
            })
            .await;

        if result.is_err() {
            // The cache layer cannot tell a failed fill from a real value;
            // make sure nothing stored under this key can shadow a retry.
            self.cache.remove(&key).await;
        }

        result
    }
}
