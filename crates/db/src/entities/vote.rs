//! Vote entity (personality-system votes on comments).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Personality classification schemes a vote can be cast in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PersonalitySystem {
    #[sea_orm(string_value = "mbti")]
    Mbti,
    #[sea_orm(string_value = "enneagram")]
    Enneagram,
    #[sea_orm(string_value = "zodiac")]
    Zodiac,
}

impl PersonalitySystem {
    /// Every supported system, in catalog order.
    pub const ALL: [Self; 3] = [Self::Mbti, Self::Enneagram, Self::Zodiac];

    /// Wire and storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mbti => "mbti",
            Self::Enneagram => "enneagram",
            Self::Zodiac => "zodiac",
        }
    }
}

impl fmt::Display for PersonalitySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonalitySystem {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|system| system.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown personality system: {s}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The comment being voted on
    #[sea_orm(indexed)]
    pub comment_id: String,

    /// Profile the comment belongs to (denormalized)
    pub profile_id: String,

    /// Anonymous per-client voter token
    pub voter_identifier: String,

    pub personality_system: PersonalitySystem,

    /// Canonical catalog value (e.g. "INTJ", "4w5", "Leo")
    pub personality_value: String,

    /// False once the vote has been withdrawn; the row is kept for history
    #[sea_orm(default_value = true)]
    pub active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::comment::Entity",
        from = "Column::CommentId",
        to = "super::comment::Column::Id",
        on_delete = "Cascade"
    )]
    Comment,
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
