//! Create vote table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Vote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Vote::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Vote::CommentId).string_len(32).not_null())
                    .col(ColumnDef::new(Vote::ProfileId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Vote::VoterIdentifier)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vote::PersonalitySystem)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vote::PersonalityValue)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vote::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Vote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Vote::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_comment")
                            .from(Vote::Table, Vote::CommentId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique partial index: at most one active vote per
        // (comment, voter, system). Inactive rows are history and may repeat.
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_vote_active_unique
                ON vote (comment_id, voter_identifier, personality_system)
                WHERE active = true;
                ",
            )
            .await?;

        // Index: active votes by comment (top comments, per-comment listing)
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE INDEX IF NOT EXISTS idx_vote_comment_active
                ON vote (comment_id, personality_system)
                WHERE active = true;
                ",
            )
            .await?;

        // Index: voter history (newest first)
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_voter_created_at")
                    .table(Vote::Table)
                    .col(Vote::VoterIdentifier)
                    .col(Vote::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: per-system distribution
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_system_value")
                    .table(Vote::Table)
                    .col(Vote::PersonalitySystem)
                    .col(Vote::PersonalityValue)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Vote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
    CommentId,
    ProfileId,
    VoterIdentifier,
    PersonalitySystem,
    PersonalityValue,
    Active,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Comment {
    Table,
    Id,
}
