//! Create post table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Post::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Post::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Post::AuthorId).string_len(32).not_null())
                    .col(ColumnDef::new(Post::Content).text().not_null())
                    .col(
                        ColumnDef::new(Post::Kind)
                            .string_len(16)
                            .not_null()
                            .check(Expr::col(Post::Kind).is_in([
                                "standard",
                                "share",
                                "announcement",
                                "question",
                                "sale",
                                "poll",
                            ])),
                    )
                    .col(
                        ColumnDef::new(Post::Visibility)
                            .string_len(16)
                            .not_null()
                            .check(Expr::col(Post::Visibility).is_in([
                                "public",
                                "followers",
                                "private",
                            ])),
                    )
                    .col(ColumnDef::new(Post::Media).json_binary().not_null())
                    .col(
                        ColumnDef::new(Post::HasMedia)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Post::Hashtags).json_binary().not_null())
                    .col(ColumnDef::new(Post::Keywords).json_binary().not_null())
                    .col(&mut counter(Post::ViewCount))
                    .col(&mut counter(Post::ShareCount))
                    .col(&mut counter(Post::CommentCount))
                    .col(&mut counter(Post::ReactionCount))
                    .col(ColumnDef::new(Post::Reactions).json_binary().not_null())
                    .col(
                        ColumnDef::new(Post::EngagementScore)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Post::IsPinned)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Post::IsEdited)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Post::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Post::OriginalPostId).string_len(32))
                    .col(ColumnDef::new(Post::ShareComment).text())
                    .col(
                        ColumnDef::new(Post::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Post::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_post_original")
                            .from(Post::Table, Post::OriginalPostId)
                            .to(Post::Table, Post::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (author_id, created_at) - profile pages and author filter
        manager
            .create_index(
                Index::create()
                    .name("idx_post_author_created_at")
                    .table(Post::Table)
                    .col(Post::AuthorId)
                    .col(Post::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: created_at - trending window scan
        manager
            .create_index(
                Index::create()
                    .name("idx_post_created_at")
                    .table(Post::Table)
                    .col(Post::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: engagement_score - popular/trending ordering
        manager
            .create_index(
                Index::create()
                    .name("idx_post_engagement_score")
                    .table(Post::Table)
                    .col(Post::EngagementScore)
                    .to_owned(),
            )
            .await?;

        // Index: original_post_id - share lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_post_original_post_id")
                    .table(Post::Table)
                    .col(Post::OriginalPostId)
                    .to_owned(),
            )
            .await?;

        // Partial index: timeline scans only touch active posts
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE INDEX IF NOT EXISTS idx_post_visibility_created_at_active
                ON post (visibility, created_at)
                WHERE is_active;
                ",
            )
            .await?;

        if manager.get_database_backend() == sea_orm::DatabaseBackend::Postgres {
            // Containment lookups for the hashtag filter
            manager
                .get_connection()
                .execute_unprepared(
                    r"
                    CREATE INDEX IF NOT EXISTS idx_post_hashtags
                    ON post
                    USING GIN (hashtags jsonb_path_ops);
                    ",
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Post::Table).to_owned())
            .await
    }
}

fn counter(column: Post) -> ColumnDef {
    ColumnDef::new(column)
        .big_integer()
        .not_null()
        .default(0)
        .to_owned()
}

#[derive(Iden, Clone, Copy)]
enum Post {
    Table,
    Id,
    AuthorId,
    Content,
    Kind,
    Visibility,
    Media,
    HasMedia,
    Hashtags,
    Keywords,
    ViewCount,
    ShareCount,
    CommentCount,
    ReactionCount,
    Reactions,
    EngagementScore,
    IsPinned,
    IsEdited,
    IsActive,
    OriginalPostId,
    ShareComment,
    CreatedAt,
    UpdatedAt,
}
