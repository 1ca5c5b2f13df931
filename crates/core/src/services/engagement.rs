//! Engagement score.

use bazaar_common::{EngagementWeights, RecencyBoost};
use bazaar_db::entities::post;
use chrono::{DateTime, Utc};

/// Counter snapshot the score is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngagementInputs {
    /// Reaction count.
    pub reactions: i64,
    /// Comment count.
    pub comments: i64,
    /// Share count.
    pub shares: i64,
    /// View count.
    pub views: i64,
    /// Post age in hours. Negative ages count as zero.
    pub age_hours: f64,
}

impl EngagementInputs {
    /// Snapshot a post row at `now`.
    #[must_use]
    pub fn from_post(post: &post::Model, now: DateTime<Utc>) -> Self {
        let age = now.signed_duration_since(post.created_at.with_timezone(&Utc));
        Self {
            reactions: post.reaction_count,
            comments: post.comment_count,
            shares: post.share_count,
            views: post.view_count,
            age_hours: age.num_seconds() as f64 / 3600.0,
        }
    }
}

/// Weighted counter sum times a recency boost.
///
/// With the default [`RecencyBoost::Floor`] the boost never drops below 1.
/// [`RecencyBoost::Additive`] starts at 2 for a brand-new post and falls to 1
/// at the horizon.
#[must_use]
pub fn engagement_score(weights: &EngagementWeights, inputs: &EngagementInputs) -> f64 {
    let raw = inputs.reactions as f64 * weights.reaction
        + inputs.comments as f64 * weights.comment
        + inputs.shares as f64 * weights.share
        + inputs.views as f64 * weights.view;

    raw * recency_boost(weights, inputs.age_hours)
}

fn recency_boost(weights: &EngagementWeights, age_hours: f64) -> f64 {
    let horizon = weights.recency_horizon_hours;
    if horizon <= 0.0 {
        return 1.0;
    }
    let decay = (horizon - age_hours.max(0.0)) / horizon;
    match weights.recency_boost {
        RecencyBoost::Floor => decay.max(1.0),
        RecencyBoost::Additive => 1.0 + decay.max(0.0),
    }
}
