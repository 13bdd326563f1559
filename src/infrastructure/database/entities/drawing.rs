//! ScheduleDrawing entity
//!
//! One row per (book, effective date, view mode). Stroke content is stored
//! as JSON text; `content_size` mirrors its byte length for the cache
//! budget aggregate.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "drawings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub book_id: Uuid,
    pub effective_date: Date,
    pub view_mode: String,
    pub content: String,
    pub version: i64,
    pub dirty: bool,
    pub updated_at: DateTimeUtc,
    pub cached_at: DateTimeUtc,
    pub hit_count: i64,
    pub content_size: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id"
    )]
    Book,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
