use sea_orm_migration::prelude::*;

/// Migration 1: Create the `modules` table.
///
/// One row per addon directory ever seen by a scan. Rows are never deleted
/// by the scanner; a vanished addon is only flagged `installable = false`.
/// Built with the schema builder rather than raw SQL so the same migration
/// runs on Postgres and on the SQLite databases used in tests.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Modules {
    Table,
    Id,
    Name,
    DisplayName,
    Version,
    Summary,
    Description,
    Active,
    Installed,
    Installable,
    Application,
    AutoInstall,
    Dependencies,
    Models,
    PendingOperation,
    InstalledAt,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Modules::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Modules::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Modules::Name)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Modules::DisplayName).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Modules::Version)
                            .string_len(50)
                            .not_null()
                            .default("1.0.0"),
                    )
                    .col(ColumnDef::new(Modules::Summary).text().null())
                    .col(ColumnDef::new(Modules::Description).text().null())
                    .col(ColumnDef::new(Modules::Active).boolean().not_null().default(false))
                    .col(ColumnDef::new(Modules::Installed).boolean().not_null().default(false))
                    .col(ColumnDef::new(Modules::Installable).boolean().not_null().default(true))
                    .col(ColumnDef::new(Modules::Application).boolean().not_null().default(false))
                    .col(ColumnDef::new(Modules::AutoInstall).boolean().not_null().default(false))
                    .col(ColumnDef::new(Modules::Dependencies).json().not_null())
                    .col(ColumnDef::new(Modules::Models).json().not_null())
                    .col(ColumnDef::new(Modules::PendingOperation).string_len(16).null())
                    .col(ColumnDef::new(Modules::InstalledAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(Modules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Modules::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_modules_active_installed")
                    .table(Modules::Table)
                    .col(Modules::Active)
                    .col(Modules::Installed)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Modules::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
