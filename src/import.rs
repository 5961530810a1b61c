use std::{collections::HashMap, sync::Arc};

use futures::{StreamExt, stream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    error::StoreError,
    models::ExternalMovie,
    store::{MovieStore, NewLocalization, NewMovie},
    tmdb::MovieProvider,
};

#[derive(Clone, Copy, Debug)]
pub struct ImportJob {
    pub external_id: i64,
}

/// Handle for dispatching import jobs to the background worker.
///
/// Delivery is best-effort and at-most-once: a job that cannot be queued (or
/// a process crash before it is picked up) is simply dropped, and the movie
/// is re-discovered on the next cache miss for it.
#[derive(Clone)]
pub struct ImportQueue {
    tx: mpsc::UnboundedSender<ImportJob>,
}

impl ImportQueue {
    pub fn enqueue(&self, job: ImportJob) {
        if self.tx.send(job).is_err() {
            warn!(external_id = job.external_id, "import worker gone, dropping job");
        }
    }

    #[cfg(test)]
    pub fn stub() -> (Self, mpsc::UnboundedReceiver<ImportJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Materializes a movie once it is known to exist upstream: fetches every
/// supported language, consolidates the results into one aggregate and
/// persists it exactly once.
pub struct Importer {
    store: Arc<dyn MovieStore>,
    provider: Arc<dyn MovieProvider>,
    languages: Vec<String>,
    default_language: String,
}

impl Importer {
    pub fn new(
        store: Arc<dyn MovieStore>,
        provider: Arc<dyn MovieProvider>,
        languages: Vec<String>,
        default_language: String,
    ) -> Self {
        Self { store, provider, languages, default_language }
    }

    /// Start the worker task and hand back the queue half. The worker lives
    /// for the lifetime of the process, detached from any request.
    pub fn spawn(self) -> ImportQueue {
        let (tx, mut rx) = mpsc::unbounded_channel::<ImportJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Err(err) = self.import(job.external_id).await {
                    error!(external_id = job.external_id, error = %err, "import failed");
                }
            }
        });
        ImportQueue { tx }
    }

    pub async fn import(&self, external_id: i64) -> Result<(), StoreError> {
        let fetched: Vec<(String, ExternalMovie)> = stream::iter(self.languages.clone())
            .map(|lang| {
                let provider = self.provider.clone();
                async move {
                    match provider.movie_details(external_id, &lang).await {
                        Ok(movie) => Some((lang, movie)),
                        Err(err) => {
                            debug!(external_id, lang = %lang, error = %err, "language fetch failed during import");
                            None
                        },
                    }
                }
            })
            .buffer_unordered(self.languages.len().max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        let mut by_lang: HashMap<String, ExternalMovie> = fetched.into_iter().collect();

        // Completion order is arbitrary; re-impose the configured language
        // order so canonical selection stays deterministic.
        let mut ordered: Vec<(String, ExternalMovie)> = Vec::with_capacity(by_lang.len());
        for lang in &self.languages {
            if let Some(movie) = by_lang.remove(lang) {
                ordered.push((lang.clone(), movie));
            }
        }

        if ordered.is_empty() {
            warn!(external_id, "no language fetch succeeded, abandoning import");
            return Ok(());
        }

        let canonical_index =
            ordered.iter().position(|(lang, _)| *lang == self.default_language).unwrap_or(0);
        let canonical = ordered[canonical_index].1.clone();

        let mut localizations = Vec::with_capacity(ordered.len());
        for (index, (lang, movie)) in ordered.iter().enumerate() {
            // Providers answer untranslated entries with the canonical text;
            // storing that copy again buys nothing.
            if index != canonical_index
                && movie.title == canonical.title
                && movie.overview == canonical.overview
            {
                info!(external_id, lang = %lang, "skipping localization identical to canonical text");
                continue;
            }
            localizations.push(NewLocalization {
                language_code: lang.clone(),
                title: movie.title.clone(),
                description: movie.overview.clone(),
            });
        }

        let aggregate = NewMovie {
            external_id,
            year: i32::from(canonical.release_date.year()),
            poster_path: canonical.poster_path.unwrap_or_default(),
            backdrop_path: canonical.backdrop_path,
            trailer_url: canonical.trailer_url,
            localizations,
        };

        match self.store.insert(aggregate).await {
            Ok(()) => {
                info!(external_id, "movie imported");
                Ok(())
            },
            Err(StoreError::Conflict) => {
                // Expected race: a concurrent import committed first.
                warn!(external_id, "movie already imported by a concurrent job");
                Ok(())
            },
            Err(err) => Err(err),
        }
    }
}
