//! Reaction entity (one reaction per user per post or comment).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a reaction points at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A post.
    #[sea_orm(string_value = "post")]
    Post,
    /// A comment.
    #[sea_orm(string_value = "comment")]
    Comment,
}

/// Closed set of reaction kinds.
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
pub enum ReactionKind {
    /// Thumbs up.
    #[sea_orm(string_value = "like")]
    Like,
    /// Heart.
    #[sea_orm(string_value = "love")]
    Love,
    /// Laughing face.
    #[sea_orm(string_value = "laugh")]
    Laugh,
    /// Surprised face.
    #[sea_orm(string_value = "wow")]
    Wow,
    /// Sad face.
    #[sea_orm(string_value = "sad")]
    Sad,
    /// Angry face.
    #[sea_orm(string_value = "angry")]
    Angry,
    /// Hug.
    #[sea_orm(string_value = "hug")]
    Hug,
}

impl ReactionKind {
    /// Key used in the stored reaction tally.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Love => "love",
            Self::Laugh => "laugh",
            Self::Wow => "wow",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Hug => "hug",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "love" => Ok(Self::Love),
            "laugh" => Ok(Self::Laugh),
            "wow" => Ok(Self::Wow),
            "sad" => Ok(Self::Sad),
            "angry" => Ok(Self::Angry),
            "hug" => Ok(Self::Hug),
            other => Err(format!("unknown reaction kind: {other}")),
        }
    }
}

/// A reaction row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reaction")]
pub struct Model {
    /// ULID.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user who reacted
    pub user_id: String,

    /// The post or comment being reacted to
    pub target_id: String,

    /// Whether `target_id` is a post or a comment.
    pub target_kind: TargetKind,

    /// Reaction kind.
    pub kind: ReactionKind,

    /// First reaction time.
    pub created_at: DateTimeWithTimeZone,

    /// Last kind change.
    pub updated_at: DateTimeWithTimeZone,
}

// Targets are polymorphic, so no foreign key. Deletes of posts and comments
// remove their reactions explicitly.
/// Targets are polymorphic, so there are no relations.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
