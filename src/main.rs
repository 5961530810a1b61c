mod cache;
mod config;
mod db;
mod entities;
mod error;
mod import;
mod models;
mod movies;
mod routes;
mod sources;
mod store;
#[cfg(test)]
mod testutil;
mod tmdb;
mod upstream;
mod watchmode;

use std::{sync::Arc, time::Duration};

use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    cache::{CacheOptions, HybridCache},
    config::Config,
    import::Importer,
    movies::MovieService,
    sources::SourceService,
    store::{MovieStore, SqlMovieStore},
    tmdb::{MovieProvider, TmdbClient},
    upstream::RetryPolicy,
    watchmode::{StreamingProvider, WatchmodeClient},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub movies: MovieService,
    pub sources: SourceService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,moviedex=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let http = reqwest::Client::builder()
        .user_agent("moviedex/0.1")
        .timeout(Duration::from_secs(30))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;

    let redis = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            Some(redis::aio::ConnectionManager::new(client).await?)
        },
        None => None,
    };
    if redis.is_some() {
        tracing::info!("distributed cache tier enabled");
    }

    let cache = HybridCache::new(
        CacheOptions {
            memory_ttl: config.cache_memory_ttl,
            fail_safe: config.cache_fail_safe,
            soft_timeout: config.cache_soft_timeout,
        },
        redis,
    );

    let retry = RetryPolicy::new(config.retry_attempts, config.retry_delay);

    let store: Arc<dyn MovieStore> =
        Arc::new(SqlMovieStore::new(db, config.default_language.clone()));
    let catalog: Arc<dyn MovieProvider> = Arc::new(TmdbClient::new(
        http.clone(),
        config.tmdb_access_token.clone(),
        config.tmdb_base_url.clone(),
        config.default_language.clone(),
        config.tmdb_rps,
        retry,
    ));
    let streaming: Arc<dyn StreamingProvider> = Arc::new(WatchmodeClient::new(
        http,
        config.watchmode_api_key.clone(),
        config.watchmode_base_url.clone(),
        config.watchmode_rps,
        retry,
    ));

    let imports = Importer::new(
        store.clone(),
        catalog.clone(),
        config.languages.clone(),
        config.default_language.clone(),
    )
    .spawn();

    let movies = MovieService::new(cache.clone(), store, catalog, imports);
    let sources = SourceService::new(cache, streaming);

    let state = Arc::new(AppState { config: config.clone(), movies, sources });

    let app = Router::new()
        .route("/movies/{id}", get(routes::get_movie))
        .route("/movies/{id}/sources", get(routes::get_sources))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
