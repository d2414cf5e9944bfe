use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Devices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Devices::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Devices::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Devices::Token).string_len(177).not_null())
                    .col(ColumnDef::new(Devices::Platform).small_integer().not_null())
                    .col(
                        ColumnDef::new(Devices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Devices::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        // Concurrency backstop for subscribe: update-then-insert is not atomic.
        manager
            .create_index(
                Index::create()
                    .table(Devices::Table)
                    .col(Devices::UserId)
                    .col(Devices::Token)
                    .unique()
                    .name("uq_devices_user_id_token")
                    .to_owned(),
            )
            .await?;
        // Feedback reconciliation looks devices up by token alone.
        manager
            .create_index(
                Index::create()
                    .table(Devices::Table)
                    .col(Devices::Token)
                    .name("idx_devices_token")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Devices::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Devices {
    Table,
    Id,
    UserId,
    Token,
    Platform,
    CreatedAt,
    UpdatedAt,
}
