//! Create reaction table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reaction::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Reaction::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Reaction::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(Reaction::TargetId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Reaction::TargetKind)
                            .string_len(16)
                            .not_null()
                            .check(Expr::col(Reaction::TargetKind).is_in(["post", "comment"])),
                    )
                    .col(
                        ColumnDef::new(Reaction::Kind)
                            .string_len(16)
                            .not_null()
                            .check(Expr::col(Reaction::Kind).is_in([
                                "like", "love", "laugh", "wow", "sad", "angry", "hug",
                            ])),
                    )
                    .col(
                        ColumnDef::new(Reaction::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Reaction::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: one reaction per user per target; backs the upsert
        manager
            .create_index(
                Index::create()
                    .name("idx_reaction_user_target")
                    .table(Reaction::Table)
                    .col(Reaction::UserId)
                    .col(Reaction::TargetId)
                    .col(Reaction::TargetKind)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (target_id, target_kind) - tally aggregation and listing
        manager
            .create_index(
                Index::create()
                    .name("idx_reaction_target")
                    .table(Reaction::Table)
                    .col(Reaction::TargetId)
                    .col(Reaction::TargetKind)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reaction::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Reaction {
    Table,
    Id,
    UserId,
    TargetId,
    TargetKind,
    Kind,
    CreatedAt,
    UpdatedAt,
}
