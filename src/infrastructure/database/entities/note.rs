//! Note entity
//!
//! Exactly one note per event. Carries the cache metadata driving eviction,
//! the person-key columns driving cross-record convergence, and the device
//! lock columns.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub event_id: Uuid,
    pub content: String,
    pub version: i64,
    pub dirty: bool,
    pub updated_at: DateTimeUtc,
    pub cached_at: DateTimeUtc,
    pub hit_count: i64,
    pub content_size: i64,
    pub person_name_key: Option<String>,
    pub person_record_key: Option<String>,
    pub locked_by_device: Option<Uuid>,
    pub locked_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::event::Entity",
        from = "Column::EventId",
        to = "super::event::Column::Id"
    )]
    Event,
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
