use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_master_data::Migration),
            Box::new(m20240301_000002_create_sales_tables::Migration),
            Box::new(m20240301_000003_create_procurement_tables::Migration),
            Box::new(m20240301_000004_create_balance_tables::Migration),
            Box::new(m20240301_000005_create_audit_logs::Migration),
        ]
    }
}

/// Every table gets an index leading with `tenant_id`.
fn tenant_index<T: IntoIden + 'static>(
    name: &str,
    table: T,
    columns: Vec<DynIden>,
    unique: bool,
) -> IndexCreateStatement {
    let mut index = Index::create();
    index.if_not_exists().name(name).table(table);
    for column in columns {
        index.col(column);
    }
    if unique {
        index.unique();
    }
    index.to_owned()
}

mod m20240301_000001_create_master_data {
    use super::tenant_index;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_master_data"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Parties::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Parties::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Parties::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Parties::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(Parties::Code).string_len(64).not_null())
                        .col(ColumnDef::new(Parties::Name).string().not_null())
                        .col(ColumnDef::new(Parties::PartyType).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Parties::CreditLimit)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parties::CurrentOutstanding)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parties::OverdueAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parties::PaymentTermDays)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parties::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Parties::Version).integer().not_null().default(1))
                        .col(
                            ColumnDef::new(Parties::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Parties::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "uq_parties_tenant_company_code",
                    Parties::Table,
                    vec![
                        Parties::TenantId.into_iden(),
                        Parties::CompanyId.into_iden(),
                        Parties::Code.into_iden(),
                    ],
                    true,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Products::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(Products::Code).string_len(64).not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Unit).string_len(32).null())
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Products::Version).integer().not_null().default(1))
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "uq_products_tenant_company_code",
                    Products::Table,
                    vec![
                        Products::TenantId.into_iden(),
                        Products::CompanyId.into_iden(),
                        Products::Code.into_iden(),
                    ],
                    true,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TenantSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TenantSettings::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TenantSettings::TenantId).uuid().not_null())
                        .col(ColumnDef::new(TenantSettings::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(TenantSettings::InvoiceQuantityPolicy)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TenantSettings::InvoiceTolerancePercent)
                                .decimal_len(9, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(TenantSettings::ReceiptTolerancePercent)
                                .decimal_len(9, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(TenantSettings::CreditPolicy)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TenantSettings::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(TenantSettings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TenantSettings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "uq_tenant_settings_tenant_company",
                    TenantSettings::Table,
                    vec![
                        TenantSettings::TenantId.into_iden(),
                        TenantSettings::CompanyId.into_iden(),
                    ],
                    true,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DocumentSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DocumentSequences::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DocumentSequences::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(DocumentSequences::DocumentType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DocumentSequences::Prefix)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DocumentSequences::NextValue)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DocumentSequences::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(DocumentSequences::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "uq_document_sequences_tenant_type",
                    DocumentSequences::Table,
                    vec![
                        DocumentSequences::TenantId.into_iden(),
                        DocumentSequences::DocumentType.into_iden(),
                    ],
                    true,
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DocumentSequences::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(TenantSettings::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Parties::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Parties {
        Table,
        Id,
        TenantId,
        CompanyId,
        Code,
        Name,
        PartyType,
        CreditLimit,
        CurrentOutstanding,
        OverdueAmount,
        PaymentTermDays,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        TenantId,
        CompanyId,
        Code,
        Name,
        Unit,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TenantSettings {
        Table,
        Id,
        TenantId,
        CompanyId,
        InvoiceQuantityPolicy,
        InvoiceTolerancePercent,
        ReceiptTolerancePercent,
        CreditPolicy,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum DocumentSequences {
        Table,
        Id,
        TenantId,
        DocumentType,
        Prefix,
        NextValue,
        Version,
        UpdatedAt,
    }
}

mod m20240301_000002_create_sales_tables {
    use super::tenant_index;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(SalesOrders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(SalesOrders::TenantId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::DocumentNumber)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::Status).string_len(32).not_null())
                        .col(ColumnDef::new(SalesOrders::OrderDate).date().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::Subtotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::DiscountTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::TaxTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::ShippingAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::GrandTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(SalesOrders::Notes).text().null())
                        .col(ColumnDef::new(SalesOrders::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(SalesOrders::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(SalesOrders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CancellationReason).text().null())
                        .col(ColumnDef::new(SalesOrders::UpdatedBy).uuid().null())
                        .col(
                            ColumnDef::new(SalesOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "uq_sales_orders_tenant_number",
                    SalesOrders::Table,
                    vec![
                        SalesOrders::TenantId.into_iden(),
                        SalesOrders::DocumentNumber.into_iden(),
                    ],
                    true,
                ))
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_sales_orders_tenant_customer",
                    SalesOrders::Table,
                    vec![
                        SalesOrders::TenantId.into_iden(),
                        SalesOrders::CompanyId.into_iden(),
                        SalesOrders::CustomerId.into_iden(),
                    ],
                    false,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderLines::TenantId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderLines::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderLines::SalesOrderId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderLines::LineNo).integer().not_null())
                        .col(ColumnDef::new(SalesOrderLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderLines::Unit).string_len(32).null())
                        .col(ColumnDef::new(SalesOrderLines::LotNumber).string_len(64).null())
                        .col(
                            ColumnDef::new(SalesOrderLines::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderLines::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderLines::DiscountAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrderLines::TaxRate)
                                .decimal_len(9, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrderLines::TaxAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrderLines::LineTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrderLines::DeliveredQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrderLines::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(SalesOrderLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_sales_order_lines_tenant_order",
                    SalesOrderLines::Table,
                    vec![
                        SalesOrderLines::TenantId.into_iden(),
                        SalesOrderLines::SalesOrderId.into_iden(),
                    ],
                    false,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Deliveries::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Deliveries::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Deliveries::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Deliveries::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(Deliveries::DocumentNumber)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Deliveries::SalesOrderId).uuid().not_null())
                        .col(ColumnDef::new(Deliveries::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Deliveries::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Deliveries::DeliveryDate).date().not_null())
                        .col(ColumnDef::new(Deliveries::Carrier).string().null())
                        .col(ColumnDef::new(Deliveries::TrackingNumber).string().null())
                        .col(ColumnDef::new(Deliveries::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(Deliveries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::ShippedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Deliveries::ConfirmedBy).uuid().null())
                        .col(
                            ColumnDef::new(Deliveries::ConfirmedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Deliveries::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(Deliveries::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Deliveries::CancellationReason).text().null())
                        .col(ColumnDef::new(Deliveries::UpdatedBy).uuid().null())
                        .col(
                            ColumnDef::new(Deliveries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "uq_deliveries_tenant_number",
                    Deliveries::Table,
                    vec![
                        Deliveries::TenantId.into_iden(),
                        Deliveries::DocumentNumber.into_iden(),
                    ],
                    true,
                ))
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_deliveries_tenant_order",
                    Deliveries::Table,
                    vec![
                        Deliveries::TenantId.into_iden(),
                        Deliveries::SalesOrderId.into_iden(),
                    ],
                    false,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DeliveryLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryLines::TenantId).uuid().not_null())
                        .col(ColumnDef::new(DeliveryLines::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(DeliveryLines::DeliveryId).uuid().not_null())
                        .col(
                            ColumnDef::new(DeliveryLines::SalesOrderLineId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryLines::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(DeliveryLines::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryLines::LotNumber).string_len(64).null())
                        .col(
                            ColumnDef::new(DeliveryLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_delivery_lines_tenant_delivery",
                    DeliveryLines::Table,
                    vec![
                        DeliveryLines::TenantId.into_iden(),
                        DeliveryLines::DeliveryId.into_iden(),
                    ],
                    false,
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliveryLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Deliveries::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SalesOrders {
        Table,
        Id,
        TenantId,
        CompanyId,
        DocumentNumber,
        CustomerId,
        Status,
        OrderDate,
        Subtotal,
        DiscountTotal,
        TaxTotal,
        ShippingAmount,
        GrandTotal,
        Notes,
        CreatedBy,
        CreatedAt,
        ApprovedBy,
        ApprovedAt,
        CancelledBy,
        CancelledAt,
        CancellationReason,
        UpdatedBy,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum SalesOrderLines {
        Table,
        Id,
        TenantId,
        CompanyId,
        SalesOrderId,
        LineNo,
        ProductId,
        Unit,
        LotNumber,
        Quantity,
        UnitPrice,
        DiscountAmount,
        TaxRate,
        TaxAmount,
        LineTotal,
        DeliveredQty,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Deliveries {
        Table,
        Id,
        TenantId,
        CompanyId,
        DocumentNumber,
        SalesOrderId,
        CustomerId,
        Status,
        DeliveryDate,
        Carrier,
        TrackingNumber,
        CreatedBy,
        CreatedAt,
        ShippedAt,
        DeliveredAt,
        ConfirmedBy,
        ConfirmedAt,
        CancelledBy,
        CancelledAt,
        CancellationReason,
        UpdatedBy,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum DeliveryLines {
        Table,
        Id,
        TenantId,
        CompanyId,
        DeliveryId,
        SalesOrderLineId,
        ProductId,
        Quantity,
        LotNumber,
        CreatedAt,
    }
}

mod m20240301_000003_create_procurement_tables {
    use super::tenant_index;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_procurement_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::TenantId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::DocumentNumber)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::OrderDate).date().not_null())
                        .col(ColumnDef::new(PurchaseOrders::ExpectedDate).date().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::Subtotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::DiscountTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::TaxTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ShippingAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::GrandTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ReceiptStatus)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::InvoiceStatus)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Notes).text().null())
                        .col(ColumnDef::new(PurchaseOrders::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::CancellationReason).text().null())
                        .col(ColumnDef::new(PurchaseOrders::UpdatedBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "uq_purchase_orders_tenant_number",
                    PurchaseOrders::Table,
                    vec![
                        PurchaseOrders::TenantId.into_iden(),
                        PurchaseOrders::DocumentNumber.into_iden(),
                    ],
                    true,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderLines::TenantId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrderLines::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderLines::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderLines::LineNo).integer().not_null())
                        .col(ColumnDef::new(PurchaseOrderLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrderLines::Unit).string_len(32).null())
                        .col(
                            ColumnDef::new(PurchaseOrderLines::OrderedQty)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::DiscountAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::TaxRate)
                                .decimal_len(9, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::TaxAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::LineTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::ReceivedQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::InvoicedQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_purchase_order_lines_tenant_order",
                    PurchaseOrderLines::Table,
                    vec![
                        PurchaseOrderLines::TenantId.into_iden(),
                        PurchaseOrderLines::PurchaseOrderId.into_iden(),
                    ],
                    false,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(GoodsReceipts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GoodsReceipts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GoodsReceipts::TenantId).uuid().not_null())
                        .col(ColumnDef::new(GoodsReceipts::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(GoodsReceipts::DocumentNumber)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GoodsReceipts::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GoodsReceipts::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(GoodsReceipts::Status).string_len(32).not_null())
                        .col(ColumnDef::new(GoodsReceipts::ReceiptDate).date().not_null())
                        .col(ColumnDef::new(GoodsReceipts::Notes).text().null())
                        .col(ColumnDef::new(GoodsReceipts::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(GoodsReceipts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GoodsReceipts::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(GoodsReceipts::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(GoodsReceipts::CancellationReason).text().null())
                        .col(ColumnDef::new(GoodsReceipts::UpdatedBy).uuid().null())
                        .col(
                            ColumnDef::new(GoodsReceipts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GoodsReceipts::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "uq_goods_receipts_tenant_number",
                    GoodsReceipts::Table,
                    vec![
                        GoodsReceipts::TenantId.into_iden(),
                        GoodsReceipts::DocumentNumber.into_iden(),
                    ],
                    true,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(GoodsReceiptLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GoodsReceiptLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GoodsReceiptLines::TenantId).uuid().not_null())
                        .col(ColumnDef::new(GoodsReceiptLines::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(GoodsReceiptLines::GoodsReceiptId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GoodsReceiptLines::PurchaseOrderLineId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GoodsReceiptLines::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(GoodsReceiptLines::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GoodsReceiptLines::LotNumber)
                                .string_len(64)
                                .null(),
                        )
                        .col(ColumnDef::new(GoodsReceiptLines::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(GoodsReceiptLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_goods_receipt_lines_tenant_receipt",
                    GoodsReceiptLines::Table,
                    vec![
                        GoodsReceiptLines::TenantId.into_iden(),
                        GoodsReceiptLines::GoodsReceiptId.into_iden(),
                    ],
                    false,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseInvoices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseInvoices::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoices::TenantId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseInvoices::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseInvoices::DocumentNumber)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoices::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseInvoices::PurchaseOrderId).uuid().null())
                        .col(ColumnDef::new(PurchaseInvoices::GoodsReceiptId).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseInvoices::SupplierInvoiceNumber)
                                .string_len(64)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoices::InvoiceDate).date().not_null())
                        .col(ColumnDef::new(PurchaseInvoices::DueDate).date().null())
                        .col(
                            ColumnDef::new(PurchaseInvoices::Subtotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::DiscountTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::TaxTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::ShippingAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::GrandTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PurchaseInvoices::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseInvoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoices::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseInvoices::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoices::RejectedBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseInvoices::RejectedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoices::RejectionReason).text().null())
                        .col(ColumnDef::new(PurchaseInvoices::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseInvoices::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::CancellationReason)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::PaidAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoices::UpdatedBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseInvoices::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "uq_purchase_invoices_tenant_number",
                    PurchaseInvoices::Table,
                    vec![
                        PurchaseInvoices::TenantId.into_iden(),
                        PurchaseInvoices::DocumentNumber.into_iden(),
                    ],
                    true,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseInvoiceLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoiceLines::TenantId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseInvoiceLines::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::PurchaseInvoiceId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoiceLines::LineNo).integer().not_null())
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::PurchaseOrderLineId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseInvoiceLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseInvoiceLines::Unit).string_len(32).null())
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::DiscountAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::TaxRate)
                                .decimal_len(9, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::TaxAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::LineTotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoiceLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_purchase_invoice_lines_tenant_invoice",
                    PurchaseInvoiceLines::Table,
                    vec![
                        PurchaseInvoiceLines::TenantId.into_iden(),
                        PurchaseInvoiceLines::PurchaseInvoiceId.into_iden(),
                    ],
                    false,
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseInvoiceLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseInvoices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(GoodsReceiptLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(GoodsReceipts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        TenantId,
        CompanyId,
        DocumentNumber,
        SupplierId,
        Status,
        OrderDate,
        ExpectedDate,
        Subtotal,
        DiscountTotal,
        TaxTotal,
        ShippingAmount,
        GrandTotal,
        ReceiptStatus,
        InvoiceStatus,
        Notes,
        CreatedBy,
        CreatedAt,
        ApprovedBy,
        ApprovedAt,
        CancelledBy,
        CancelledAt,
        CancellationReason,
        UpdatedBy,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderLines {
        Table,
        Id,
        TenantId,
        CompanyId,
        PurchaseOrderId,
        LineNo,
        ProductId,
        Unit,
        OrderedQty,
        UnitPrice,
        DiscountAmount,
        TaxRate,
        TaxAmount,
        LineTotal,
        ReceivedQty,
        InvoicedQty,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum GoodsReceipts {
        Table,
        Id,
        TenantId,
        CompanyId,
        DocumentNumber,
        PurchaseOrderId,
        SupplierId,
        Status,
        ReceiptDate,
        Notes,
        CreatedBy,
        CreatedAt,
        CancelledBy,
        CancelledAt,
        CancellationReason,
        UpdatedBy,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum GoodsReceiptLines {
        Table,
        Id,
        TenantId,
        CompanyId,
        GoodsReceiptId,
        PurchaseOrderLineId,
        ProductId,
        Quantity,
        LotNumber,
        ExpiryDate,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseInvoices {
        Table,
        Id,
        TenantId,
        CompanyId,
        DocumentNumber,
        SupplierId,
        PurchaseOrderId,
        GoodsReceiptId,
        SupplierInvoiceNumber,
        Status,
        InvoiceDate,
        DueDate,
        Subtotal,
        DiscountTotal,
        TaxTotal,
        ShippingAmount,
        GrandTotal,
        CreatedBy,
        CreatedAt,
        ApprovedBy,
        ApprovedAt,
        RejectedBy,
        RejectedAt,
        RejectionReason,
        CancelledBy,
        CancelledAt,
        CancellationReason,
        PaidAt,
        UpdatedBy,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum PurchaseInvoiceLines {
        Table,
        Id,
        TenantId,
        CompanyId,
        PurchaseInvoiceId,
        LineNo,
        PurchaseOrderLineId,
        ProductId,
        Unit,
        Quantity,
        UnitPrice,
        DiscountAmount,
        TaxRate,
        TaxAmount,
        LineTotal,
        CreatedAt,
    }
}

mod m20240301_000004_create_balance_tables {
    use super::tenant_index;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_balance_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PartyObligations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PartyObligations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PartyObligations::TenantId).uuid().not_null())
                        .col(ColumnDef::new(PartyObligations::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(PartyObligations::PartyId).uuid().not_null())
                        .col(
                            ColumnDef::new(PartyObligations::Direction)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PartyObligations::DocumentType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PartyObligations::DocumentId).uuid().not_null())
                        .col(
                            ColumnDef::new(PartyObligations::Amount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PartyObligations::SettledAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PartyObligations::DueDate).date().not_null())
                        .col(
                            ColumnDef::new(PartyObligations::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PartyObligations::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(PartyObligations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PartyObligations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_party_obligations_tenant_party",
                    PartyObligations::Table,
                    vec![
                        PartyObligations::TenantId.into_iden(),
                        PartyObligations::PartyId.into_iden(),
                        PartyObligations::Status.into_iden(),
                    ],
                    false,
                ))
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_party_obligations_tenant_document",
                    PartyObligations::Table,
                    vec![
                        PartyObligations::TenantId.into_iden(),
                        PartyObligations::DocumentId.into_iden(),
                    ],
                    false,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Payments::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(Payments::PartyId).uuid().not_null())
                        .col(ColumnDef::new(Payments::Amount).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Payments::PaymentDate).date().not_null())
                        .col(ColumnDef::new(Payments::Reference).string().null())
                        .col(ColumnDef::new(Payments::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_payments_tenant_party",
                    Payments::Table,
                    vec![Payments::TenantId.into_iden(), Payments::PartyId.into_iden()],
                    false,
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PaymentAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentAllocations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentAllocations::TenantId).uuid().not_null())
                        .col(ColumnDef::new(PaymentAllocations::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(PaymentAllocations::PaymentId).uuid().not_null())
                        .col(
                            ColumnDef::new(PaymentAllocations::ObligationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAllocations::Amount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAllocations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_payment_allocations_tenant_payment",
                    PaymentAllocations::Table,
                    vec![
                        PaymentAllocations::TenantId.into_iden(),
                        PaymentAllocations::PaymentId.into_iden(),
                    ],
                    false,
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentAllocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PartyObligations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PartyObligations {
        Table,
        Id,
        TenantId,
        CompanyId,
        PartyId,
        Direction,
        DocumentType,
        DocumentId,
        Amount,
        SettledAmount,
        DueDate,
        Status,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        TenantId,
        CompanyId,
        PartyId,
        Amount,
        PaymentDate,
        Reference,
        CreatedBy,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PaymentAllocations {
        Table,
        Id,
        TenantId,
        CompanyId,
        PaymentId,
        ObligationId,
        Amount,
        CreatedAt,
    }
}

mod m20240301_000005_create_audit_logs {
    use super::tenant_index;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_audit_logs"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AuditLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AuditLogs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(AuditLogs::TenantId).uuid().not_null())
                        .col(ColumnDef::new(AuditLogs::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(AuditLogs::EntityType).string_len(64).not_null())
                        .col(ColumnDef::new(AuditLogs::EntityId).uuid().not_null())
                        .col(ColumnDef::new(AuditLogs::Action).string_len(32).not_null())
                        .col(ColumnDef::new(AuditLogs::Actor).uuid().not_null())
                        .col(ColumnDef::new(AuditLogs::Before).json().null())
                        .col(ColumnDef::new(AuditLogs::After).json().null())
                        .col(
                            ColumnDef::new(AuditLogs::OccurredAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(tenant_index(
                    "idx_audit_logs_tenant_entity",
                    AuditLogs::Table,
                    vec![AuditLogs::TenantId.into_iden(), AuditLogs::EntityId.into_iden()],
                    false,
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AuditLogs {
        Table,
        Id,
        TenantId,
        CompanyId,
        EntityType,
        EntityId,
        Action,
        Actor,
        Before,
        After,
        OccurredAt,
    }
}
