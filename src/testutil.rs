//! Scripted trait implementations shared by the service tests.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::{ProviderError, StoreError},
    models::{ExternalMovie, MovieSource, MovieView, SourceKind},
    store::{MovieStore, NewMovie},
    tmdb::MovieProvider,
    watchmode::StreamingProvider,
};

pub fn external_movie(id: i64, title: &str, overview: Option<&str>) -> ExternalMovie {
    ExternalMovie {
        external_id: id,
        title: title.to_string(),
        overview: overview.map(str::to_string),
        poster_path: Some("/poster.jpg".to_string()),
        backdrop_path: None,
        release_date: "1999-10-15".parse().unwrap(),
        trailer_url: None,
    }
}

pub fn sample_source(provider_name: &str) -> MovieSource {
    MovieSource {
        provider_name: provider_name.to_string(),
        kind: SourceKind::Subscription,
        url: format!("https://{}.example/watch", provider_name.to_lowercase()),
        quality: "HD".to_string(),
        price: None,
    }
}

#[derive(Clone)]
pub enum Scripted {
    Movie(ExternalMovie),
    NotFound,
    Unauthorized,
    Upstream,
}

/// Catalog provider answering from a script, with a call counter and an
/// optional artificial latency. Unscripted (id, lang) pairs answer NotFound.
pub struct ScriptedProvider {
    responses: HashMap<(i64, String), Scripted>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self { responses: HashMap::new(), calls: AtomicUsize::new(0), delay: Duration::ZERO }
    }

    pub fn with(mut self, id: i64, lang: &str, script: Scripted) -> Self {
        self.responses.insert((id, lang.to_string()), script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MovieProvider for ScriptedProvider {
    async fn movie_details(
        &self,
        external_id: i64,
        lang: &str,
    ) -> Result<ExternalMovie, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.responses.get(&(external_id, lang.to_string())) {
            Some(Scripted::Movie(movie)) => Ok(movie.clone()),
            Some(Scripted::Unauthorized) => Err(ProviderError::Unauthorized),
            Some(Scripted::Upstream) => Err(ProviderError::Upstream("scripted failure".into())),
            Some(Scripted::NotFound) | None => Err(ProviderError::NotFound),
        }
    }
}

/// Store double that answers `find_localized` from a fixed value and records
/// every inserted aggregate.
pub struct RecordingStore {
    found: Option<MovieView>,
    force_conflict: bool,
    pub inserted: Mutex<Vec<NewMovie>>,
    pub find_calls: AtomicUsize,
}

impl RecordingStore {
    pub fn empty() -> Self {
        Self {
            found: None,
            force_conflict: false,
            inserted: Mutex::new(Vec::new()),
            find_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_movie(view: MovieView) -> Self {
        Self { found: Some(view), ..Self::empty() }
    }

    pub fn with_conflict() -> Self {
        Self { force_conflict: true, ..Self::empty() }
    }
}

#[async_trait]
impl MovieStore for RecordingStore {
    async fn find_localized(
        &self,
        _external_id: i64,
        _lang: &str,
    ) -> Result<Option<MovieView>, StoreError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.found.clone())
    }

    async fn insert(&self, movie: NewMovie) -> Result<(), StoreError> {
        if self.force_conflict {
            return Err(StoreError::Conflict);
        }
        self.inserted.lock().await.push(movie);
        Ok(())
    }
}

/// Streaming provider double with independent counters for the resolution
/// and offer calls.
pub struct ScriptedStreaming {
    title_id: Option<i64>,
    offers: Vec<MovieSource>,
    fail_sources: bool,
    pub resolve_calls: AtomicUsize,
    pub source_calls: AtomicUsize,
}

impl ScriptedStreaming {
    pub fn unmatched() -> Self {
        Self {
            title_id: None,
            offers: Vec::new(),
            fail_sources: false,
            resolve_calls: AtomicUsize::new(0),
            source_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_offers(title_id: i64, offers: Vec<MovieSource>) -> Self {
        Self { title_id: Some(title_id), offers, ..Self::unmatched() }
    }

    pub fn with_failing_sources(title_id: i64) -> Self {
        Self { title_id: Some(title_id), fail_sources: true, ..Self::unmatched() }
    }
}

#[async_trait]
impl StreamingProvider for ScriptedStreaming {
    async fn resolve_title(&self, _external_id: i64) -> Result<Option<i64>, ProviderError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.title_id)
    }

    async fn sources(
        &self,
        _title_id: i64,
        _region: &str,
    ) -> Result<Vec<MovieSource>, ProviderError> {
        self.source_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sources {
            return Err(ProviderError::Upstream("scripted failure".into()));
        }
        Ok(self.offers.clone())
    }
}
