use crate::entities::prelude::*;
use crate::entities::query_records;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(QueryRecords)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Secondary ordering: per-user listings sort on create_time.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_queries_by_user")
                    .table(QueryRecords)
                    .col(query_records::Column::UserId)
                    .col(query_records::Column::CreateTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_queries_ttl")
                    .table(QueryRecords)
                    .col(query_records::Column::Ttl)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QueryRecords).to_owned())
            .await?;
        Ok(())
    }
}
