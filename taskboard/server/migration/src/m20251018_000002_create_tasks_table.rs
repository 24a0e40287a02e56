use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const DEFAULT_STATUS: &str = "pending";
const DEFAULT_PRIORITY: &str = "medium";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(string(Tasks::Id).primary_key())
                    .col(string(Tasks::Title))
                    .col(string_len(Tasks::Status, 16).default(DEFAULT_STATUS))
                    .col(string_len(Tasks::Priority, 16).default(DEFAULT_PRIORITY))
                    .col(timestamp_with_time_zone_null(Tasks::DueDate))
                    .col(
                        timestamp_with_time_zone(Tasks::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Tasks::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
    Title,
    Status,
    Priority,
    DueDate,
    CreatedAt,
    UpdatedAt,
}
