use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_production_tables::Migration),
            Box::new(m20240601_000002_create_reading_tables::Migration),
            Box::new(m20240601_000003_create_alert_tables::Migration),
        ]
    }
}

mod m20240601_000001_create_production_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_production_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Warehouse::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Warehouse::WarehouseId)
                                .integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Warehouse::Categories).string().null())
                        .col(ColumnDef::new(Warehouse::OwnerId).big_integer().null())
                        .col(ColumnDef::new(Warehouse::InvitationToken).string().null())
                        .col(
                            ColumnDef::new(Warehouse::TokenExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Line::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Line::LineId)
                                .big_integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Line::WarehouseId).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_line_warehouse_id")
                                .from(Line::Table, Line::WarehouseId)
                                .to(Warehouse::Table, Warehouse::WarehouseId)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Sensors::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Sensors::SensorId)
                                .big_integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Sensors::Model).string().not_null())
                        .col(ColumnDef::new(Sensors::Unit).string().not_null())
                        .col(ColumnDef::new(Sensors::LineId).big_integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sensors_line_id")
                                .from(Sensors::Table, Sensors::LineId)
                                .to(Line::Table, Line::LineId)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sensors_line_id")
                        .table(Sensors::Table)
                        .col(Sensors::LineId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Batches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Batches::BatchId)
                                .big_integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Batches::LineId).big_integer().not_null())
                        .col(
                            ColumnDef::new(Batches::Quantity)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Batches::ProducedDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_batches_line_id")
                                .from(Batches::Table, Batches::LineId)
                                .to(Line::Table, Line::LineId)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Batches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sensors::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Line::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Warehouse::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Warehouse {
        Table,
        WarehouseId,
        Categories,
        OwnerId,
        InvitationToken,
        TokenExpiresAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Line {
        Table,
        LineId,
        WarehouseId,
    }

    #[derive(DeriveIden)]
    pub(super) enum Sensors {
        Table,
        SensorId,
        Model,
        Unit,
        LineId,
    }

    #[derive(DeriveIden)]
    pub(super) enum Batches {
        Table,
        BatchId,
        LineId,
        Quantity,
        ProducedDate,
    }
}

mod m20240601_000002_create_reading_tables {
    use super::m20240601_000001_create_production_tables::{Batches, Line, Sensors, Warehouse};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_reading_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Product::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Product::ProductId)
                                .big_integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Product::BatchId).big_integer().not_null())
                        .col(ColumnDef::new(Product::WarehouseId).integer().not_null())
                        .col(ColumnDef::new(Product::LineId).big_integer().not_null())
                        .col(ColumnDef::new(Product::Type).string().null())
                        .col(ColumnDef::new(Product::FixedAcidity).double().null())
                        .col(ColumnDef::new(Product::VolatileAcidity).double().null())
                        .col(ColumnDef::new(Product::CitricAcid).double().null())
                        .col(ColumnDef::new(Product::ResidualSugar).double().null())
                        .col(ColumnDef::new(Product::Chlorides).double().null())
                        .col(ColumnDef::new(Product::FreeSulfurDioxide).double().null())
                        .col(ColumnDef::new(Product::TotalSulfurDioxide).double().null())
                        .col(ColumnDef::new(Product::Density).double().null())
                        .col(ColumnDef::new(Product::Ph).double().null())
                        .col(ColumnDef::new(Product::Sulphates).double().null())
                        .col(ColumnDef::new(Product::Alcohol).double().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_batch_id")
                                .from(Product::Table, Product::BatchId)
                                .to(Batches::Table, Batches::BatchId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_warehouse_id")
                                .from(Product::Table, Product::WarehouseId)
                                .to(Warehouse::Table, Warehouse::WarehouseId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_line_id")
                                .from(Product::Table, Product::LineId)
                                .to(Line::Table, Line::LineId),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_warehouse")
                        .table(Product::Table)
                        .col(Product::WarehouseId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_batch")
                        .table(Product::Table)
                        .col(Product::BatchId)
                        .to_owned(),
                )
                .await?;

            // One row per (product, sensor); the composite key is what makes
            // duplicate measure writes a no-op.
            manager
                .create_table(
                    Table::create()
                        .table(Measure::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Measure::ProductId).big_integer().not_null())
                        .col(ColumnDef::new(Measure::SensorId).big_integer().not_null())
                        .col(ColumnDef::new(Measure::Value).double().not_null())
                        .primary_key(
                            Index::create()
                                .col(Measure::ProductId)
                                .col(Measure::SensorId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_measure_product_id")
                                .from(Measure::Table, Measure::ProductId)
                                .to(Product::Table, Product::ProductId)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_measure_sensor_id")
                                .from(Measure::Table, Measure::SensorId)
                                .to(Sensors::Table, Sensors::SensorId),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AiModel::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AiModel::ModelId)
                                .integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(AiModel::Version).string().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(IsPredicted::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IsPredicted::ProductId)
                                .big_integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(IsPredicted::TimePredict)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(IsPredicted::QualityScore).double().not_null())
                        .col(ColumnDef::new(IsPredicted::Confidence).string().not_null())
                        .col(
                            ColumnDef::new(IsPredicted::QualityCategory)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(IsPredicted::AiModel).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_is_predicted_product_id")
                                .from(IsPredicted::Table, IsPredicted::ProductId)
                                .to(Product::Table, Product::ProductId)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_is_predicted_ai_model")
                                .from(IsPredicted::Table, IsPredicted::AiModel)
                                .to(AiModel::Table, AiModel::ModelId),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_time_predict")
                        .table(IsPredicted::Table)
                        .col(IsPredicted::TimePredict)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IsPredicted::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(AiModel::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Measure::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Product::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Product {
        Table,
        ProductId,
        BatchId,
        WarehouseId,
        LineId,
        Type,
        FixedAcidity,
        VolatileAcidity,
        CitricAcid,
        ResidualSugar,
        Chlorides,
        FreeSulfurDioxide,
        TotalSulfurDioxide,
        Density,
        Ph,
        Sulphates,
        Alcohol,
    }

    #[derive(DeriveIden)]
    enum Measure {
        Table,
        ProductId,
        SensorId,
        Value,
    }

    #[derive(DeriveIden)]
    enum AiModel {
        Table,
        ModelId,
        Version,
    }

    #[derive(DeriveIden)]
    enum IsPredicted {
        Table,
        ProductId,
        TimePredict,
        QualityScore,
        Confidence,
        QualityCategory,
        AiModel,
    }
}

mod m20240601_000003_create_alert_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_alert_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AlertSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AlertSettings::SettingId)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(AlertSettings::WarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AlertSettings::Metric).string().not_null())
                        .col(ColumnDef::new(AlertSettings::MinValue).double().null())
                        .col(ColumnDef::new(AlertSettings::MaxValue).double().null())
                        .col(
                            ColumnDef::new(AlertSettings::Enabled)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_alert_settings_warehouse_metric")
                        .table(AlertSettings::Table)
                        .col(AlertSettings::WarehouseId)
                        .col(AlertSettings::Metric)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Alerts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Alerts::AlertId)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Alerts::WarehouseId).integer().not_null())
                        .col(ColumnDef::new(Alerts::ProductId).big_integer().null())
                        .col(ColumnDef::new(Alerts::Title).string().not_null())
                        .col(ColumnDef::new(Alerts::Description).text().not_null())
                        .col(
                            ColumnDef::new(Alerts::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Alerts::CreatedAt)
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
                        .name("idx_alerts_warehouse_created_at")
                        .table(Alerts::Table)
                        .col(Alerts::WarehouseId)
                        .col(Alerts::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Alerts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(AlertSettings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AlertSettings {
        Table,
        SettingId,
        WarehouseId,
        Metric,
        MinValue,
        MaxValue,
        Enabled,
    }

    #[derive(DeriveIden)]
    enum Alerts {
        Table,
        AlertId,
        WarehouseId,
        ProductId,
        Title,
        Description,
        IsRead,
        CreatedAt,
    }
}
