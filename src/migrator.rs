use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240201_000001_create_products_table::Migration),
            Box::new(m20240201_000002_create_coupons_table::Migration),
            Box::new(m20240201_000003_create_sales_table::Migration),
            Box::new(m20240201_000004_create_sale_items_table::Migration),
            Box::new(m20240201_000005_create_abandoned_carts_table::Migration),
            Box::new(m20240201_000006_create_merchant_settings_table::Migration),
        ]
    }
}

mod m20240201_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::OwnerId).uuid().not_null())
                        .col(
                            ColumnDef::new(Products::Slug)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::PriceCents).big_integer().not_null())
                        .col(ColumnDef::new(Products::DeliveryUrl).string())
                        .col(ColumnDef::new(Products::BumpProductId).uuid())
                        .col(ColumnDef::new(Products::BumpPriceCents).big_integer())
                        .col(ColumnDef::new(Products::UpsellProductId).uuid())
                        .col(ColumnDef::new(Products::UpsellPriceCents).big_integer())
                        .col(ColumnDef::new(Products::Active).boolean().not_null())
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
                .create_index(
                    Index::create()
                        .name("idx_products_owner_id")
                        .table(Products::Table)
                        .col(Products::OwnerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Products {
        Table,
        Id,
        OwnerId,
        Slug,
        Name,
        PriceCents,
        DeliveryUrl,
        BumpProductId,
        BumpPriceCents,
        UpsellProductId,
        UpsellPriceCents,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240201_000002_create_coupons_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000002_create_coupons_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Coupons::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Coupons::Code).string().not_null())
                        .col(
                            ColumnDef::new(Coupons::Kind)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Coupons::Value).big_integer().not_null())
                        .col(ColumnDef::new(Coupons::Active).boolean().not_null())
                        .col(ColumnDef::new(Coupons::Automatic).boolean().not_null())
                        .col(ColumnDef::new(Coupons::MaxUses).integer())
                        .col(ColumnDef::new(Coupons::UsedCount).integer().not_null())
                        .col(ColumnDef::new(Coupons::ExpiresAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(Coupons::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_coupons_product_code")
                        .table(Coupons::Table)
                        .col(Coupons::ProductId)
                        .col(Coupons::Code)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Coupons {
        Table,
        Id,
        ProductId,
        Code,
        Kind,
        Value,
        Active,
        Automatic,
        MaxUses,
        UsedCount,
        ExpiresAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240201_000003_create_sales_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000003_create_sales_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Sales::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sales::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Sales::OwnerId).uuid().not_null())
                        .col(
                            ColumnDef::new(Sales::ChargeId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Sales::UpsellChargeId).string())
                        .col(ColumnDef::new(Sales::CustomerName).string().not_null())
                        .col(ColumnDef::new(Sales::CustomerEmail).string().not_null())
                        .col(ColumnDef::new(Sales::CustomerWhatsapp).string().not_null())
                        .col(ColumnDef::new(Sales::CustomerIp).string())
                        .col(ColumnDef::new(Sales::PaymentMethod).string().not_null())
                        .col(ColumnDef::new(Sales::Status).string().not_null())
                        .col(ColumnDef::new(Sales::TotalCents).big_integer().not_null())
                        .col(
                            ColumnDef::new(Sales::OriginalTotalCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sales::DiscountCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Sales::CouponCode).string())
                        .col(ColumnDef::new(Sales::TrackingParams).json())
                        .col(
                            ColumnDef::new(Sales::GatewayFeeCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sales::PlatformFeeCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Sales::NetCents).big_integer().not_null())
                        .col(
                            ColumnDef::new(Sales::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sales::PaidAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sales_owner_id")
                        .table(Sales::Table)
                        .col(Sales::OwnerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Sales::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Sales {
        Table,
        Id,
        OwnerId,
        ChargeId,
        UpsellChargeId,
        CustomerName,
        CustomerEmail,
        CustomerWhatsapp,
        CustomerIp,
        PaymentMethod,
        Status,
        TotalCents,
        OriginalTotalCents,
        DiscountCents,
        CouponCode,
        TrackingParams,
        GatewayFeeCents,
        PlatformFeeCents,
        NetCents,
        CreatedAt,
        PaidAt,
    }
}

mod m20240201_000004_create_sale_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000004_create_sale_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SaleItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(SaleItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(SaleItems::SaleId).uuid().not_null())
                        .col(ColumnDef::new(SaleItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(SaleItems::ProductName).string().not_null())
                        .col(ColumnDef::new(SaleItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(SaleItems::UnitPriceCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleItems::OriginalPriceCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleItems::IsOrderBump).boolean().not_null())
                        .col(ColumnDef::new(SaleItems::IsUpsell).boolean().not_null())
                        .col(ColumnDef::new(SaleItems::DeliveryUrl).string())
                        .col(
                            ColumnDef::new(SaleItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sale_items_sale_id")
                        .table(SaleItems::Table)
                        .col(SaleItems::SaleId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SaleItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum SaleItems {
        Table,
        Id,
        SaleId,
        ProductId,
        ProductName,
        Quantity,
        UnitPriceCents,
        OriginalPriceCents,
        IsOrderBump,
        IsUpsell,
        DeliveryUrl,
        CreatedAt,
    }
}

mod m20240201_000005_create_abandoned_carts_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000005_create_abandoned_carts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AbandonedCarts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AbandonedCarts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AbandonedCarts::OwnerId).uuid().not_null())
                        .col(ColumnDef::new(AbandonedCarts::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(AbandonedCarts::ProductName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AbandonedCarts::PotentialValueCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AbandonedCarts::CustomerName).string())
                        .col(
                            ColumnDef::new(AbandonedCarts::CustomerEmail)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AbandonedCarts::CustomerWhatsapp).string())
                        .col(
                            ColumnDef::new(AbandonedCarts::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(AbandonedCarts::TrackingParams).json())
                        .col(
                            ColumnDef::new(AbandonedCarts::LastInteractionAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AbandonedCarts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AbandonedCarts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_abandoned_carts_owner_id")
                        .table(AbandonedCarts::Table)
                        .col(AbandonedCarts::OwnerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AbandonedCarts::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum AbandonedCarts {
        Table,
        Id,
        OwnerId,
        ProductId,
        ProductName,
        PotentialValueCents,
        CustomerName,
        CustomerEmail,
        CustomerWhatsapp,
        Status,
        TrackingParams,
        LastInteractionAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240201_000006_create_merchant_settings_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000006_create_merchant_settings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MerchantSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MerchantSettings::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MerchantSettings::OwnerId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(MerchantSettings::CommissionPercent)
                                .decimal_len(10, 6)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MerchantSettings::FixedFeeCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MerchantSettings::TrackingWebhookUrl).string())
                        .col(ColumnDef::new(MerchantSettings::TrackingWebhookToken).string())
                        .col(
                            ColumnDef::new(MerchantSettings::TrackingEnabled)
                                .boolean()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MerchantSettings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MerchantSettings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MerchantSettings::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum MerchantSettings {
        Table,
        Id,
        OwnerId,
        CommissionPercent,
        FixedFeeCents,
        TrackingWebhookUrl,
        TrackingWebhookToken,
        TrackingEnabled,
        CreatedAt,
        UpdatedAt,
    }
}
