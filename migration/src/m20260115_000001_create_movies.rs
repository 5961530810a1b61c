use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(uuid(Movies::Id).primary_key())
                    .col(big_integer(Movies::ExternalId))
                    .col(integer(Movies::Year))
                    .col(string(Movies::PosterPath))
                    .col(string_null(Movies::BackdropPath))
                    .col(string_null(Movies::TrailerUrl))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_external_id")
                    .table(Movies::Table)
                    .col(Movies::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Localizations::Table)
                    .if_not_exists()
                    .col(uuid(Localizations::Id).primary_key())
                    .col(uuid(Localizations::MovieId))
                    .col(string(Localizations::LanguageCode))
                    .col(string(Localizations::Title))
                    .col(string_null(Localizations::Description))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_localizations_movie_id")
                            .from(Localizations::Table, Localizations::MovieId)
                            .to(Movies::Table, Movies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_localizations_movie_language")
                    .table(Localizations::Table)
                    .col(Localizations::MovieId)
                    .col(Localizations::LanguageCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Localizations::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    Id,
    ExternalId,
    Year,
    PosterPath,
    BackdropPath,
    TrailerUrl,
}

#[derive(DeriveIden)]
enum Localizations {
    Table,
    Id,
    MovieId,
    LanguageCode,
    Title,
    Description,
}
