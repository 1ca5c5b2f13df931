//! Follow entity (directed follower -> following edges).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A follow edge.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "follow")]
pub struct Model {
    /// ULID.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user who is following
    #[sea_orm(indexed)]
    pub follower_id: String,

    /// The user being followed
    #[sea_orm(indexed)]
    pub following_id: String,

    /// Notify the follower about new posts.
    #[sea_orm(default_value = true)]
    pub notify_on_post: bool,

    /// Notify the follower about new comments.
    #[sea_orm(default_value = false)]
    pub notify_on_comment: bool,

    /// How much the follower interacts with the followed user's posts
    #[sea_orm(default_value = 0.0)]
    pub engagement_score: f64,

    /// When the edge was created.
    pub created_at: DateTimeWithTimeZone,
}

/// User ids are opaque, so edges relate to nothing here.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
