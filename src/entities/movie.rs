use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "movies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub external_id: i64,
    pub year: i32,
    pub poster_path: String,
    pub backdrop_path: Option<String>,
    pub trailer_url: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::localization::Entity")]
    Localization,
}

impl Related<super::localization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Localization.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
