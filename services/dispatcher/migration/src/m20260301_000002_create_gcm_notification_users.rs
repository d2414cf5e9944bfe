use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GcmNotificationUsers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GcmNotificationUsers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GcmNotificationUsers::UserId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(GcmNotificationUsers::NotificationKeyName)
                            .string_len(177)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GcmNotificationUsers::NotificationKey)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GcmNotificationUsers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(GcmNotificationUsers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GcmNotificationUsers::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum GcmNotificationUsers {
    Table,
    Id,
    UserId,
    NotificationKeyName,
    NotificationKey,
    CreatedAt,
    UpdatedAt,
}
