//! Initial migration to create all tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create books table
        manager
            .create_table(
                Table::create()
                    .table(Books::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Books::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Books::Name).string().not_null())
                    .col(ColumnDef::new(Books::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Books::ArchivedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Books::Version).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Books::Dirty).boolean().not_null().default(false))
                    .col(ColumnDef::new(Books::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // Create events table with the soft-removal and reschedule-chain columns
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Events::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Events::BookId).uuid().not_null())
                    .col(ColumnDef::new(Events::Title).string().not_null())
                    .col(ColumnDef::new(Events::StartsAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Events::EndsAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Events::RecordNumber).string())
                    .col(ColumnDef::new(Events::Kind).string().not_null())
                    .col(ColumnDef::new(Events::IsRemoved).boolean().not_null().default(false))
                    .col(ColumnDef::new(Events::RemovalReason).string())
                    .col(ColumnDef::new(Events::OriginalEventId).uuid())
                    .col(ColumnDef::new(Events::NewEventId).uuid())
                    .col(ColumnDef::new(Events::Version).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Events::Dirty).boolean().not_null().default(false))
                    .col(ColumnDef::new(Events::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Events::Table, Events::BookId)
                            .to(Books::Table, Books::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_book_id")
                    .table(Events::Table)
                    .col(Events::BookId)
                    .to_owned(),
            )
            .await?;

        // Create notes table (1:1 with events)
        manager
            .create_table(
                Table::create()
                    .table(Notes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Notes::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Notes::EventId).uuid().not_null().unique_key())
                    .col(ColumnDef::new(Notes::Content).text().not_null())
                    .col(ColumnDef::new(Notes::Version).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Notes::Dirty).boolean().not_null().default(false))
                    .col(ColumnDef::new(Notes::UpdatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Notes::CachedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Notes::HitCount).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Notes::ContentSize).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Notes::PersonNameKey).string())
                    .col(ColumnDef::new(Notes::PersonRecordKey).string())
                    .col(ColumnDef::new(Notes::LockedByDevice).uuid())
                    .col(ColumnDef::new(Notes::LockedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Notes::Table, Notes::EventId)
                            .to(Events::Table, Events::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Person-group scans filter on both key columns
        manager
            .create_index(
                Index::create()
                    .name("idx_notes_person_key")
                    .table(Notes::Table)
                    .col(Notes::PersonNameKey)
                    .col(Notes::PersonRecordKey)
                    .to_owned(),
            )
            .await?;

        // Create drawings table keyed by (book, date, view mode)
        manager
            .create_table(
                Table::create()
                    .table(Drawings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Drawings::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Drawings::BookId).uuid().not_null())
                    .col(ColumnDef::new(Drawings::EffectiveDate).date().not_null())
                    .col(ColumnDef::new(Drawings::ViewMode).string().not_null())
                    .col(ColumnDef::new(Drawings::Content).text().not_null())
                    .col(ColumnDef::new(Drawings::Version).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Drawings::Dirty).boolean().not_null().default(false))
                    .col(ColumnDef::new(Drawings::UpdatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Drawings::CachedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Drawings::HitCount).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Drawings::ContentSize).big_integer().not_null().default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Drawings::Table, Drawings::BookId)
                            .to(Books::Table, Books::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_drawings_page")
                    .table(Drawings::Table)
                    .col(Drawings::BookId)
                    .col(Drawings::EffectiveDate)
                    .col(Drawings::ViewMode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create cache_policy singleton
        manager
            .create_table(
                Table::create()
                    .table(CachePolicy::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CachePolicy::Id).integer().not_null().primary_key())
                    .col(ColumnDef::new(CachePolicy::MaxCacheSizeMb).big_integer().not_null())
                    .col(ColumnDef::new(CachePolicy::CacheDurationDays).big_integer().not_null())
                    .col(ColumnDef::new(CachePolicy::AutoCleanup).boolean().not_null())
                    .col(ColumnDef::new(CachePolicy::LastCleanupAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .exec_stmt(
                Query::insert()
                    .into_table(CachePolicy::Table)
                    .columns([
                        CachePolicy::Id,
                        CachePolicy::MaxCacheSizeMb,
                        CachePolicy::CacheDurationDays,
                        CachePolicy::AutoCleanup,
                    ])
                    .values_panic([1.into(), 200.into(), 90.into(), true.into()])
                    .to_owned(),
            )
            .await?;

        // Create sync_state singleton
        manager
            .create_table(
                Table::create()
                    .table(SyncState::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncState::Id).integer().not_null().primary_key())
                    .col(ColumnDef::new(SyncState::LastSyncAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .exec_stmt(
                Query::insert()
                    .into_table(SyncState::Table)
                    .columns([SyncState::Id])
                    .values_panic([1.into()])
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncState::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CachePolicy::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Drawings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Books::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum Books {
    Table,
    Id,
    Name,
    CreatedAt,
    ArchivedAt,
    Version,
    Dirty,
    UpdatedAt,
}

#[derive(Iden)]
enum Events {
    Table,
    Id,
    BookId,
    Title,
    StartsAt,
    EndsAt,
    RecordNumber,
    Kind,
    IsRemoved,
    RemovalReason,
    OriginalEventId,
    NewEventId,
    Version,
    Dirty,
    UpdatedAt,
}

#[derive(Iden)]
enum Notes {
    Table,
    Id,
    EventId,
    Content,
    Version,
    Dirty,
    UpdatedAt,
    CachedAt,
    HitCount,
    ContentSize,
    PersonNameKey,
    PersonRecordKey,
    LockedByDevice,
    LockedAt,
}

#[derive(Iden)]
enum Drawings {
    Table,
    Id,
    BookId,
    EffectiveDate,
    ViewMode,
    Content,
    Version,
    Dirty,
    UpdatedAt,
    CachedAt,
    HitCount,
    ContentSize,
}

#[derive(Iden)]
enum CachePolicy {
    Table,
    Id,
    MaxCacheSizeMb,
    CacheDurationDays,
    AutoCleanup,
    LastCleanupAt,
}

#[derive(Iden)]
enum SyncState {
    Table,
    Id,
    LastSyncAt,
}
