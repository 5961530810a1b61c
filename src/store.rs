use async_trait::async_trait;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, SqlErr,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    entities::{localization, movie},
    error::StoreError,
    models::{LocalizationView, MovieView},
};

/// A movie aggregate ready for persistence: canonical fields plus the full
/// localization set, written in one transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMovie {
    pub external_id: i64,
    pub year: i32,
    pub poster_path: String,
    pub backdrop_path: Option<String>,
    pub trailer_url: Option<String>,
    pub localizations: Vec<NewLocalization>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewLocalization {
    pub language_code: String,
    pub title: String,
    pub description: Option<String>,
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Localized movie view for `external_id`, preferring `lang` and falling
    /// back to the default language. `Ok(None)` when the movie is unknown or
    /// has no usable localization.
    async fn find_localized(
        &self,
        external_id: i64,
        lang: &str,
    ) -> Result<Option<MovieView>, StoreError>;

    /// Insert the aggregate. A unique-constraint hit on the external id maps
    /// to [`StoreError::Conflict`].
    async fn insert(&self, movie: NewMovie) -> Result<(), StoreError>;
}

pub struct SqlMovieStore {
    db: DatabaseConnection,
    default_language: String,
}

impl SqlMovieStore {
    pub fn new(db: DatabaseConnection, default_language: String) -> Self {
        Self { db, default_language }
    }
}

#[async_trait]
impl MovieStore for SqlMovieStore {
    async fn find_localized(
        &self,
        external_id: i64,
        lang: &str,
    ) -> Result<Option<MovieView>, StoreError> {
        let Some(row) = movie::Entity::find()
            .filter(movie::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let mut candidates = localization::Entity::find()
            .filter(localization::Column::MovieId.eq(row.id))
            .filter(
                localization::Column::LanguageCode
                    .is_in([lang, self.default_language.as_str()]),
            )
            .all(&self.db)
            .await?;

        let picked = candidates
            .iter()
            .position(|entry| entry.language_code == lang)
            .or_else(|| {
                candidates.iter().position(|entry| entry.language_code == self.default_language)
            });

        let Some(index) = picked else {
            return Ok(None);
        };
        let localized = candidates.swap_remove(index);

        Ok(Some(MovieView {
            id: row.external_id,
            year: row.year,
            poster_path: row.poster_path,
            backdrop_path: row.backdrop_path,
            trailer_url: row.trailer_url,
            localization: LocalizationView {
                language_code: localized.language_code,
                title: localized.title,
                overview: localized.description,
            },
        }))
    }

    async fn insert(&self, aggregate: NewMovie) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        let movie_id = Uuid::now_v7();
        let row = movie::ActiveModel {
            id: Set(movie_id),
            external_id: Set(aggregate.external_id),
            year: Set(aggregate.year),
            poster_path: Set(aggregate.poster_path),
            backdrop_path: Set(aggregate.backdrop_path),
            trailer_url: Set(aggregate.trailer_url),
        };

        match movie::Entity::insert(row).exec(&txn).await {
            Ok(_) => {},
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(StoreError::Conflict);
            },
            Err(err) => return Err(err.into()),
        }

        for entry in aggregate.localizations {
            let row = localization::ActiveModel {
                id: Set(Uuid::now_v7()),
                movie_id: Set(movie_id),
                language_code: Set(entry.language_code),
                title: Set(entry.title),
                description: Set(entry.description),
            };
            localization::Entity::insert(row).exec(&txn).await?;
        }

        txn.commit().await?;
        Ok(())
    }
}
