use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_directory_tables::Migration),
            Box::new(m20250101_000002_create_stocks_table::Migration),
            Box::new(m20250101_000003_create_requests_tables::Migration),
            Box::new(m20250101_000004_create_distributions_table::Migration),
            Box::new(m20250101_000005_create_log_activities_table::Migration),
            Box::new(m20250101_000006_directory_unique_indexes::Migration),
        ]
    }
}

/// Quantity column: fixed-point on Postgres, REAL on SQLite so that stored
/// values keep numeric comparison semantics.
fn quantity_column<T: IntoIden>(backend: sea_orm::DbBackend, name: T) -> ColumnDef {
    let mut def = ColumnDef::new(name);
    match backend {
        sea_orm::DbBackend::Sqlite => def.double(),
        _ => def.decimal_len(19, 4),
    };
    def
}

mod m20250101_000001_create_directory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_directory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Branches::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Branches::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Branches::Name).string().not_null())
                        .col(ColumnDef::new(Branches::Address).string().null())
                        .col(
                            ColumnDef::new(Branches::IsCenter)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Branches::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Branches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Branches::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Materials::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Materials::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Materials::Name).string().not_null())
                        .col(ColumnDef::new(Materials::Unit).string().not_null())
                        .col(
                            ColumnDef::new(Materials::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Materials::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Materials::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Schools::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Schools::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Schools::Name).string().not_null())
                        .col(ColumnDef::new(Schools::Address).string().null())
                        .col(
                            ColumnDef::new(Schools::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Schools::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(ColumnDef::new(Users::BranchId).uuid().null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_users_branch_id")
                                .from(Users::Table, Users::BranchId)
                                .to(Branches::Table, Branches::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_email")
                        .table(Users::Table)
                        .col(Users::Email)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_branch_id")
                        .table(Users::Table)
                        .col(Users::BranchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Schools::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Materials::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Branches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Branches {
        Table,
        Id,
        Name,
        Address,
        IsCenter,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Materials {
        Table,
        Id,
        Name,
        Unit,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Schools {
        Table,
        Id,
        Name,
        Address,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Name,
        Email,
        Role,
        BranchId,
        IsActive,
        CreatedAt,
    }
}

mod m20250101_000002_create_stocks_table {
    use super::m20250101_000001_create_directory_tables::{Branches, Materials};
    use super::quantity_column;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_stocks_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(Stocks::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Stocks::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Stocks::MaterialId).uuid().not_null())
                        .col(ColumnDef::new(Stocks::BranchId).uuid().not_null())
                        .col(quantity_column(backend, Stocks::Qty).not_null().default(0))
                        .col(
                            ColumnDef::new(Stocks::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Stocks::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stocks_material_id")
                                .from(Stocks::Table, Stocks::MaterialId)
                                .to(Materials::Table, Materials::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stocks_branch_id")
                                .from(Stocks::Table, Stocks::BranchId)
                                .to(Branches::Table, Branches::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            // One ledger row per (material, branch)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stocks_material_branch")
                        .table(Stocks::Table)
                        .col(Stocks::MaterialId)
                        .col(Stocks::BranchId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stocks_branch_id")
                        .table(Stocks::Table)
                        .col(Stocks::BranchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Stocks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Stocks {
        Table,
        Id,
        MaterialId,
        BranchId,
        Qty,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000003_create_requests_tables {
    use super::m20250101_000001_create_directory_tables::{Branches, Materials};
    use super::quantity_column;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_requests_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(Requests::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Requests::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Requests::Code).string().not_null())
                        .col(ColumnDef::new(Requests::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Requests::Status).string().not_null())
                        .col(ColumnDef::new(Requests::Notes).text().null())
                        .col(ColumnDef::new(Requests::ProcessedById).uuid().null())
                        .col(
                            ColumnDef::new(Requests::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Requests::RequestDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Requests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_requests_branch_id")
                                .from(Requests::Table, Requests::BranchId)
                                .to(Branches::Table, Branches::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_requests_code")
                        .table(Requests::Table)
                        .col(Requests::Code)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_requests_branch_status")
                        .table(Requests::Table)
                        .col(Requests::BranchId)
                        .col(Requests::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RequestItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RequestItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RequestItems::RequestId).uuid().not_null())
                        .col(ColumnDef::new(RequestItems::MaterialId).uuid().not_null())
                        .col(quantity_column(backend, RequestItems::Qty).not_null())
                        .col(quantity_column(backend, RequestItems::QtyApproved).null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_request_items_request_id")
                                .from(RequestItems::Table, RequestItems::RequestId)
                                .to(Requests::Table, Requests::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_request_items_material_id")
                                .from(RequestItems::Table, RequestItems::MaterialId)
                                .to(Materials::Table, Materials::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_request_items_request_id")
                        .table(RequestItems::Table)
                        .col(RequestItems::RequestId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RequestCodeSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RequestCodeSequences::Name)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequestCodeSequences::Value)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RequestCodeSequences::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RequestItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Requests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Requests {
        Table,
        Id,
        Code,
        BranchId,
        Status,
        Notes,
        ProcessedById,
        ProcessedAt,
        RequestDate,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum RequestItems {
        Table,
        Id,
        RequestId,
        MaterialId,
        Qty,
        QtyApproved,
    }

    #[derive(DeriveIden)]
    enum RequestCodeSequences {
        Table,
        Name,
        Value,
    }
}

mod m20250101_000004_create_distributions_table {
    use super::m20250101_000001_create_directory_tables::{Branches, Schools};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_distributions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Distributions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Distributions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Distributions::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Distributions::SchoolId).uuid().not_null())
                        .col(ColumnDef::new(Distributions::CourierName).string().not_null())
                        .col(
                            ColumnDef::new(Distributions::ContainerCount)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Distributions::ReturnedContainer)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Distributions::Status).string().not_null())
                        .col(
                            ColumnDef::new(Distributions::SentAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Distributions::ReturnedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Distributions::CreatedById).uuid().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_distributions_branch_id")
                                .from(Distributions::Table, Distributions::BranchId)
                                .to(Branches::Table, Branches::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_distributions_school_id")
                                .from(Distributions::Table, Distributions::SchoolId)
                                .to(Schools::Table, Schools::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_distributions_branch_sent_at")
                        .table(Distributions::Table)
                        .col(Distributions::BranchId)
                        .col(Distributions::SentAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Distributions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Distributions {
        Table,
        Id,
        BranchId,
        SchoolId,
        CourierName,
        ContainerCount,
        ReturnedContainer,
        Status,
        SentAt,
        ReturnedAt,
        CreatedById,
    }
}

mod m20250101_000005_create_log_activities_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000005_create_log_activities_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LogActivities::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LogActivities::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LogActivities::UserId).uuid().not_null())
                        .col(ColumnDef::new(LogActivities::Action).string().not_null())
                        .col(ColumnDef::new(LogActivities::Details).json().not_null())
                        .col(
                            ColumnDef::new(LogActivities::CreatedAt)
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
                        .name("idx_log_activities_user_action")
                        .table(LogActivities::Table)
                        .col(LogActivities::UserId)
                        .col(LogActivities::Action)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LogActivities::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum LogActivities {
        Table,
        Id,
        UserId,
        Action,
        Details,
        CreatedAt,
    }
}

/// Expression and partial indexes are written as DDL; both Postgres and SQLite
/// accept the same statements.
mod m20250101_000006_directory_unique_indexes {
    use sea_orm::ConnectionTrait;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000006_directory_unique_indexes"
        }
    }

    const UP: [&str; 3] = [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_single_center ON branches (is_center) WHERE is_center",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_name_lower ON branches (lower(name))",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_materials_name_lower ON materials (lower(name))",
    ];

    const DOWN: [&str; 3] = [
        "DROP INDEX IF EXISTS idx_materials_name_lower",
        "DROP INDEX IF EXISTS idx_branches_name_lower",
        "DROP INDEX IF EXISTS idx_branches_single_center",
    ];

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let db = manager.get_connection();
            for statement in UP {
                db.execute_unprepared(statement).await?;
            }
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let db = manager.get_connection();
            for statement in DOWN {
                db.execute_unprepared(statement).await?;
            }
            Ok(())
        }
    }
}
