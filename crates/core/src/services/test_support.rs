//! Model fixtures for service unit tests.

use bazaar_db::entities::{PostKind, ReactionKind, TargetKind, Visibility, comment, post, reaction};
use chrono::Utc;
use serde_json::json;

pub fn post_fixture(id: &str, author_id: &str) -> post::Model {
    let now = Utc::now().fixed_offset();
    post::Model {
        id: id.to_string(),
        author_id: author_id.to_string(),
        content: format!("post {id}"),
        kind: PostKind::Standard,
        visibility: Visibility::Public,
        media: json!([]),
        has_media: false,
        hashtags: json!([]),
        keywords: json!([]),
        view_count: 0,
        share_count: 0,
        comment_count: 0,
        reaction_count: 0,
        reactions: json!({}),
        engagement_score: 0.0,
        is_pinned: false,
        is_edited: false,
        is_active: true,
        original_post_id: None,
        share_comment: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn comment_fixture(id: &str, post_id: &str, parent_id: Option<&str>) -> comment::Model {
    let now = Utc::now().fixed_offset();
    comment::Model {
        id: id.to_string(),
        post_id: post_id.to_string(),
        author_id: "commenter".to_string(),
        content: format!("comment {id}"),
        parent_id: parent_id.map(str::to_string),
        reply_count: 0,
        reaction_count: 0,
        reactions: json!({}),
        media: json!([]),
        is_edited: false,
        is_hidden: false,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn reaction_fixture(user_id: &str, target_id: &str, kind: ReactionKind) -> reaction::Model {
    let now = Utc::now().fixed_offset();
    reaction::Model {
        id: format!("r-{user_id}-{target_id}"),
        user_id: user_id.to_string(),
        target_id: target_id.to_string(),
        target_kind: TargetKind::Post,
        kind,
        created_at: now,
        updated_at: now,
    }
}
