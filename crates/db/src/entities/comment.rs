//! Comment entity.
//!
//! Comments carry the denormalized vote tally: `vote_stats` maps
//! system -> value -> count and `total_votes` is the sum of every count.
//! Both columns are only ever changed by single-statement updates in
//! `CommentRepository`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "comment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Profile this comment was posted on
    #[sea_orm(indexed)]
    pub profile_id: String,

    /// Display name of the author
    pub author: String,

    #[sea_orm(nullable)]
    pub title: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Vote tally (system -> value -> count)
    #[sea_orm(column_type = "JsonBinary")]
    pub vote_stats: Json,

    /// Sum of all counts in `vote_stats` (denormalized)
    #[sea_orm(default_value = 0)]
    pub total_votes: i32,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vote::Entity")]
    Vote,
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
