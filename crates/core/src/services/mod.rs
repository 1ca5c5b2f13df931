//! Business logic services.

pub mod audit;
pub mod comment;
pub mod counters;
pub mod engagement;
pub mod following;
pub mod invalidation;
pub mod normalizer;
pub mod post;
pub mod reaction;
pub mod thread;
pub mod timeline;
pub mod trending;
pub mod visibility;

#[cfg(test)]
mod test_support;

pub use audit::{AuditReport, AuditService, CounterDrift};
pub use comment::{CommentService, CreateCommentInput, UpdateCommentInput};
pub use counters::{CountMaintainer, ReactionTally};
pub use engagement::{EngagementInputs, engagement_score};
pub use following::{FollowOptions, FollowPreferencesInput, FollowingService};
pub use invalidation::FeedInvalidator;
pub use normalizer::{ContentTokens, extract_hashtags, extract_keywords};
pub use post::{CreatePostInput, PostService, ShareInput, UpdatePostInput};
pub use reaction::{ReactOutcome, ReactionService, UnreactOutcome};
pub use thread::{AuthorRef, ThreadComment, ThreadExpansion, ThreadService};
pub use timeline::TimelineService;
pub use trending::TrendingService;
pub use visibility::{can_view, comment_visible, ensure_visible};
