use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_suppliers_table::Migration),
            Box::new(m20250101_000002_create_invoices_table::Migration),
            Box::new(m20250101_000003_create_invoice_items_table::Migration),
            Box::new(m20250101_000004_create_training_data_table::Migration),
            Box::new(m20250101_000005_create_ml_models_table::Migration),
        ]
    }
}

// Migration implementations

mod m20250101_000001_create_suppliers_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_suppliers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Suppliers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Suppliers::Name).string_len(255).not_null())
                        .col(ColumnDef::new(Suppliers::Address).text().null())
                        .col(ColumnDef::new(Suppliers::TaxId).string_len(50).null())
                        .col(
                            ColumnDef::new(Suppliers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Suppliers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // get-or-create looks suppliers up by name
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_suppliers_name")
                        .table(Suppliers::Table)
                        .col(Suppliers::Name)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
        Name,
        Address,
        TaxId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000002_create_invoices_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_invoices_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Invoices::InvoiceNumber).string_len(100).null())
                        .col(ColumnDef::new(Invoices::IssueDate).date().null())
                        .col(ColumnDef::new(Invoices::DueDate).date().null())
                        .col(ColumnDef::new(Invoices::SupplierId).uuid().null())
                        .col(ColumnDef::new(Invoices::TotalAmount).decimal_len(10, 2).null())
                        .col(ColumnDef::new(Invoices::TaxAmount).decimal_len(10, 2).null())
                        .col(
                            ColumnDef::new(Invoices::Status)
                                .string_len(20)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(Invoices::ConfidenceScore)
                                .double()
                                .not_null()
                                .default(0.0),
                        )
                        .col(ColumnDef::new(Invoices::FilePath).string().null())
                        .col(ColumnDef::new(Invoices::OriginalFilename).string().null())
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_supplier_id")
                                .from(Invoices::Table, Invoices::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_status")
                        .table(Invoices::Table)
                        .col(Invoices::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_supplier_id")
                        .table(Invoices::Table)
                        .col(Invoices::SupplierId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        InvoiceNumber,
        IssueDate,
        DueDate,
        SupplierId,
        TotalAmount,
        TaxAmount,
        Status,
        ConfidenceScore,
        FilePath,
        OriginalFilename,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
    }
}

mod m20250101_000003_create_invoice_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_invoice_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InvoiceItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceItems::InvoiceId).uuid().not_null())
                        .col(ColumnDef::new(InvoiceItems::Description).string_len(255).not_null())
                        .col(ColumnDef::new(InvoiceItems::Quantity).decimal_len(10, 2).not_null())
                        .col(ColumnDef::new(InvoiceItems::UnitPrice).decimal_len(10, 2).not_null())
                        .col(ColumnDef::new(InvoiceItems::TotalPrice).decimal_len(10, 2).not_null())
                        .col(
                            ColumnDef::new(InvoiceItems::TaxRate)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoice_items_invoice_id")
                                .from(InvoiceItems::Table, InvoiceItems::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_items_invoice_id")
                        .table(InvoiceItems::Table)
                        .col(InvoiceItems::InvoiceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InvoiceItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InvoiceItems {
        Table,
        Id,
        InvoiceId,
        Description,
        Quantity,
        UnitPrice,
        TotalPrice,
        TaxRate,
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
    }
}

mod m20250101_000004_create_training_data_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_training_data_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TrainingData::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TrainingData::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TrainingData::InvoiceId).uuid().not_null())
                        .col(ColumnDef::new(TrainingData::OriginalExtraction).json().not_null())
                        .col(ColumnDef::new(TrainingData::CorrectedExtraction).json().not_null())
                        .col(
                            ColumnDef::new(TrainingData::UsedForTraining)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(TrainingData::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TrainingData::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_training_data_invoice_id")
                                .from(TrainingData::Table, TrainingData::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_training_data_invoice_id")
                        .table(TrainingData::Table)
                        .col(TrainingData::InvoiceId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_training_data_used_for_training")
                        .table(TrainingData::Table)
                        .col(TrainingData::UsedForTraining)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TrainingData::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TrainingData {
        Table,
        Id,
        InvoiceId,
        OriginalExtraction,
        CorrectedExtraction,
        UsedForTraining,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
    }
}

mod m20250101_000005_create_ml_models_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000005_create_ml_models_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MlModels::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(MlModels::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(MlModels::Name).string_len(100).not_null())
                        .col(ColumnDef::new(MlModels::Version).string_len(20).not_null())
                        .col(ColumnDef::new(MlModels::Accuracy).double().not_null())
                        .col(ColumnDef::new(MlModels::FilePath).string().not_null())
                        .col(
                            ColumnDef::new(MlModels::IsActive)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(MlModels::CreatedAt)
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
                        .name("idx_ml_models_is_active")
                        .table(MlModels::Table)
                        .col(MlModels::IsActive)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MlModels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MlModels {
        Table,
        Id,
        Name,
        Version,
        Accuracy,
        FilePath,
        IsActive,
        CreatedAt,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}

/// Reverts every applied migration.
pub async fn reset_database(db_url: &str) -> Result<()> {
    let db = Database::connect(db_url).await?;
    Migrator::reset(&db).await?;
    info!("All migrations rolled back");
    Ok(())
}
