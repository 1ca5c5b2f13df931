//! Post entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::media::MediaDescriptor;

/// Post visibility levels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Everyone, including anonymous readers.
    #[sea_orm(string_value = "public")]
    Public,
    /// Visible to followers of the author (and the author).
    #[sea_orm(string_value = "followers")]
    Followers,
    /// Visible to the author only.
    #[sea_orm(string_value = "private")]
    Private,
}

/// Kind of post.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    /// Plain post.
    #[sea_orm(string_value = "standard")]
    Standard,
    /// Re-publication of another post. Only created through the share path.
    #[sea_orm(string_value = "share")]
    Share,
    /// Announcement.
    #[sea_orm(string_value = "announcement")]
    Announcement,
    /// Question.
    #[sea_orm(string_value = "question")]
    Question,
    /// Item for sale.
    #[sea_orm(string_value = "sale")]
    Sale,
    /// Poll.
    #[sea_orm(string_value = "poll")]
    Poll,
}

/// A post row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "post")]
pub struct Model {
    /// ULID.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Author user ID
    #[sea_orm(indexed)]
    pub author_id: String,

    /// Body text, possibly empty for shares and media posts.
    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Post kind.
    pub kind: PostKind,

    /// Audience.
    pub visibility: Visibility,

    /// Attached media descriptors, stored verbatim
    #[sea_orm(column_type = "JsonBinary")]
    pub media: Json,

    /// Whether `media` is non-empty (denormalized for filtering)
    #[sea_orm(default_value = false)]
    pub has_media: bool,

    /// Normalized hashtags (sorted, distinct)
    #[sea_orm(column_type = "JsonBinary")]
    pub hashtags: Json,

    /// Normalized keywords (sorted, distinct)
    #[sea_orm(column_type = "JsonBinary")]
    pub keywords: Json,

    /// Recorded views.
    #[sea_orm(default_value = 0)]
    pub view_count: i64,

    /// Shares pointing at this post.
    #[sea_orm(default_value = 0)]
    pub share_count: i64,

    /// Top-level comment count (denormalized)
    #[sea_orm(default_value = 0)]
    pub comment_count: i64,

    /// Reaction count (denormalized)
    #[sea_orm(default_value = 0)]
    pub reaction_count: i64,

    /// Reactions (kind -> count)
    #[sea_orm(column_type = "JsonBinary")]
    pub reactions: Json,

    /// Derived ranking value, recomputed on every counter change.
    #[sea_orm(default_value = 0.0)]
    pub engagement_score: f64,

    /// Pinned to the author's profile.
    #[sea_orm(default_value = false)]
    pub is_pinned: bool,

    /// Content changed after creation.
    #[sea_orm(default_value = false)]
    pub is_edited: bool,

    /// Archived posts are inactive and hidden from feeds.
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    /// Shared post (root original, never another share)
    #[sea_orm(nullable, indexed)]
    pub original_post_id: Option<String>,

    /// Text the sharer added.
    #[sea_orm(column_type = "Text", nullable)]
    pub share_comment: Option<String>,

    /// Creation time.
    pub created_at: DateTimeWithTimeZone,

    /// Last write.
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Decoded media list. Malformed entries yield an empty list.
    #[must_use]
    pub fn media_descriptors(&self) -> Vec<MediaDescriptor> {
        MediaDescriptor::list_from_json(&self.media)
    }

    /// Stored hashtags.
    #[must_use]
    pub fn hashtag_list(&self) -> Vec<String> {
        serde_json::from_value(self.hashtags.clone()).unwrap_or_default()
    }
}

/// Relations of a post.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The shared post.
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::OriginalPostId",
        to = "Column::Id",
        on_delete = "SetNull"
    )]
    Original,

    /// Comments on the post.
    #[sea_orm(has_many = "super::comment::Entity")]
    Comment,
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
