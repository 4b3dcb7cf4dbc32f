use sea_orm::entity::prelude::*;

/// Flat, denormalized table: one row per movie per genre, no foreign keys.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "movies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub genre: String,
    pub category: String,
    pub title: String,
    pub year: i32,
    pub distribution: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub url: String,
    pub cover_photo: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
