//! Comment entity (threaded replies to posts).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A comment row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "comment")]
pub struct Model {
    /// ULID.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Post the thread belongs to (never changes)
    #[sea_orm(indexed)]
    pub post_id: String,

    /// Who wrote it.
    pub author_id: String,

    /// Body text.
    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Parent comment; `None` for top-level comments
    #[sea_orm(nullable, indexed)]
    pub parent_id: Option<String>,

    /// Direct reply count (denormalized)
    #[sea_orm(default_value = 0)]
    pub reply_count: i64,

    /// Reaction count (denormalized)
    #[sea_orm(default_value = 0)]
    pub reaction_count: i64,

    /// Reactions (kind -> count)
    #[sea_orm(column_type = "JsonBinary")]
    pub reactions: Json,

    /// Attachments as a JSON list of media descriptors.
    #[sea_orm(column_type = "JsonBinary")]
    pub media: Json,

    /// Content changed after creation.
    #[sea_orm(default_value = false)]
    pub is_edited: bool,

    /// Hidden by the post author; still counted
    #[sea_orm(default_value = false)]
    pub is_hidden: bool,

    /// Inactive comments are treated as gone.
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    /// Creation time.
    pub created_at: DateTimeWithTimeZone,

    /// Last write.
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether this comment hangs directly off the post.
    #[must_use]
    pub const fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Relations of a comment.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The post the comment belongs to.
    #[sea_orm(
        belongs_to = "super::post::Entity",
        from = "Column::PostId",
        to = "super::post::Column::Id",
        on_delete = "Cascade"
    )]
    Post,

    /// The comment replied to.
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_delete = "Cascade"
    )]
    Parent,
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Post.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
