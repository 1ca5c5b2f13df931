//! Single-post visibility checks for write and read paths.

use bazaar_common::{AppError, AppResult};
use bazaar_db::entities::{Visibility, comment, post};
use bazaar_db::repositories::FollowRepository;
use sea_orm::ConnectionTrait;

/// Whether `viewer_id` may see `post`. Matches the timeline visibility rule,
/// plus the author's own private posts.
pub async fn can_view<C: ConnectionTrait>(
    conn: &C,
    follow_repo: &FollowRepository,
    viewer_id: Option<&str>,
    post: &post::Model,
) -> AppResult<bool> {
    if !post.is_active {
        return Ok(false);
    }

    match (post.visibility, viewer_id) {
        (Visibility::Public, _) => Ok(true),
        (_, None) => Ok(false),
        (_, Some(viewer)) if viewer == post.author_id => Ok(true),
        (Visibility::Followers, Some(viewer)) => Ok(follow_repo
            .find_by_pair_in(conn, viewer, &post.author_id)
            .await?
            .is_some()),
        (Visibility::Private, Some(_)) => Ok(false),
    }
}

/// `post` if `viewer_id` may see it, `PostNotFound` otherwise.
pub async fn ensure_visible<C: ConnectionTrait>(
    conn: &C,
    follow_repo: &FollowRepository,
    viewer_id: Option<&str>,
    post: post::Model,
) -> AppResult<post::Model> {
    if can_view(conn, follow_repo, viewer_id, &post).await? {
        Ok(post)
    } else {
        Err(AppError::PostNotFound(post.id))
    }
}

/// Hidden comments are only shown to their author.
#[must_use]
pub fn comment_visible(viewer_id: Option<&str>, comment: &comment::Model) -> bool {
    comment.is_active && (!comment.is_hidden || viewer_id == Some(comment.author_id.as_str()))
}
