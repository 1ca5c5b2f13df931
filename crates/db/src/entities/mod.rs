//! Database entities.

pub mod comment;
pub mod follow;
pub mod media;
pub mod post;
pub mod reaction;

pub use comment::Entity as Comment;
pub use follow::Entity as Follow;
pub use media::MediaDescriptor;
pub use post::{Entity as Post, PostKind, Visibility};
pub use reaction::{Entity as Reaction, ReactionKind, TargetKind};
