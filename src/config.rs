use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub tmdb_base_url: String,
    pub tmdb_access_token: String,
    pub tmdb_rps: u32,
    pub watchmode_base_url: String,
    pub watchmode_api_key: String,
    pub watchmode_rps: u32,
    /// Supported language tags, in priority order. Always contains
    /// `default_language`.
    pub languages: Vec<String>,
    pub default_language: String,
    pub cache_memory_ttl: Duration,
    pub cache_fail_safe: Duration,
    pub cache_soft_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://moviedex.db?mode=rwc".to_string());

        let redis_url = std::env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty());

        let tmdb_access_token = std::env::var("TMDB_ACCESS_TOKEN").unwrap_or_default();
        let tmdb_base_url = std::env::var("TMDB_BASE_URL")
            .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string());
        let tmdb_rps: u32 =
            std::env::var("TMDB_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(4);

        let watchmode_api_key = std::env::var("WATCHMODE_API_KEY").unwrap_or_default();
        let watchmode_base_url = std::env::var("WATCHMODE_BASE_URL")
            .unwrap_or_else(|_| "https://api.watchmode.com/v1".to_string());
        let watchmode_rps: u32 =
            std::env::var("WATCHMODE_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(2);

        let default_language =
            std::env::var("DEFAULT_LANGUAGE").unwrap_or_else(|_| "en-US".to_string());

        let mut languages: Vec<String> = std::env::var("LANGUAGES")
            .unwrap_or_else(|_| "en-US,de-DE,fr-FR,uk-UA".to_string())
            .split(',')
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        if !languages.contains(&default_language) {
            languages.insert(0, default_language.clone());
        }

        let cache_memory_ttl_secs: u64 =
            std::env::var("CACHE_MEMORY_TTL_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(60);
        let cache_fail_safe_hours: u64 =
            std::env::var("CACHE_FAIL_SAFE_HOURS").ok().and_then(|s| s.parse().ok()).unwrap_or(24);
        let cache_soft_timeout_ms: u64 = std::env::var("CACHE_SOFT_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        let retry_attempts: u32 =
            std::env::var("PROVIDER_RETRY_ATTEMPTS").ok().and_then(|s| s.parse().ok()).unwrap_or(3);
        let retry_delay_ms: u64 = std::env::var("PROVIDER_RETRY_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            redis_url,
            tmdb_base_url,
            tmdb_access_token,
            tmdb_rps,
            watchmode_base_url,
            watchmode_api_key,
            watchmode_rps,
            languages,
            default_language,
            cache_memory_ttl: Duration::from_secs(cache_memory_ttl_secs),
            cache_fail_safe: Duration::from_secs(cache_fail_safe_hours * 3600),
            cache_soft_timeout: Duration::from_millis(cache_soft_timeout_ms),
            retry_attempts,
            retry_delay: Duration::from_millis(retry_delay_ms),
        })
    }
}
