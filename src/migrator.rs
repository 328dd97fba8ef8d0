use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_identity_and_catalog_tables::Migration),
            Box::new(m20240101_000002_create_cart_tables::Migration),
            Box::new(m20240101_000003_create_discount_tables::Migration),
            Box::new(m20240101_000004_create_order_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_identity_and_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_identity_and_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(
                            ColumnDef::new(Users::Role)
                                .string_len(20)
                                .not_null()
                                .default("customer"),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(ColumnDef::new(Products::Price).big_integer().not_null())
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
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
                        .if_not_exists()
                        .name("idx_products_category_id")
                        .table(Products::Table)
                        .col(Products::CategoryId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariants::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProductVariants::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(ProductVariants::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(ProductVariants::Name).string().not_null())
                        .col(
                            ColumnDef::new(ProductVariants::Price)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_variants_product")
                                .from(ProductVariants::Table, ProductVariants::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Email,
        Name,
        Role,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        CategoryId,
        Price,
        Stock,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductVariants {
        Table,
        Id,
        ProductId,
        Sku,
        Name,
        Price,
        Stock,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Carts::OwnerId).uuid().not_null().unique_key())
                        .col(
                            ColumnDef::new(Carts::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // No foreign key to products: a line outlives a product that leaves
            // the catalog and is reported as unavailable.
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::VariantId).uuid().null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartItems::PriceAtAddition)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::Position)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_cart_product")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .col(CartItems::ProductId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        OwnerId,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        ProductId,
        VariantId,
        Quantity,
        PriceAtAddition,
        Position,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_discount_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_discount_tables"
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
                        .col(ColumnDef::new(Coupons::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Coupons::Code)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Coupons::DiscountType).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Coupons::DiscountValue)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::MinPurchaseAmount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::MaxDiscountAmount).big_integer().null())
                        .col(ColumnDef::new(Coupons::UsageLimit).integer().null())
                        .col(
                            ColumnDef::new(Coupons::TimesUsed)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Coupons::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
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
                .create_table(
                    Table::create()
                        .table(Promotions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Promotions::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Promotions::Name).string().not_null())
                        .col(ColumnDef::new(Promotions::Description).text().null())
                        .col(
                            ColumnDef::new(Promotions::PromotionType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Promotions::TargetType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Promotions::TargetId).uuid().null())
                        .col(
                            ColumnDef::new(Promotions::DiscountValue)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Promotions::MinPurchaseAmount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Promotions::MaxDiscountAmount)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Promotions::StartDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Promotions::EndDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Promotions::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Promotions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Promotions::UpdatedAt)
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
                        .name("idx_promotions_window")
                        .table(Promotions::Table)
                        .col(Promotions::IsActive)
                        .col(Promotions::StartDate)
                        .col(Promotions::EndDate)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Promotions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
        Code,
        DiscountType,
        DiscountValue,
        MinPurchaseAmount,
        MaxDiscountAmount,
        UsageLimit,
        TimesUsed,
        ExpiresAt,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Promotions {
        Table,
        Id,
        Name,
        Description,
        PromotionType,
        TargetType,
        TargetId,
        DiscountValue,
        MinPurchaseAmount,
        MaxDiscountAmount,
        StartDate,
        EndDate,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string_len(40)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::OwnerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Subtotal).big_integer().not_null())
                        .col(
                            ColumnDef::new(Orders::PromotionDiscount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::CouponDiscount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DiscountApplied)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::TotalAmount).big_integer().not_null())
                        .col(ColumnDef::new(Orders::CouponId).uuid().null())
                        .col(ColumnDef::new(Orders::PromotionId).uuid().null())
                        .col(
                            ColumnDef::new(Orders::FreeShipping)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Orders::ShippingAddress).text().not_null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(
                            ColumnDef::new(Orders::OrderDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_owner_id")
                        .table(Orders::Table)
                        .col(Orders::OwnerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariantId).uuid().null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::UnitPrice).big_integer().not_null())
                        .col(ColumnDef::new(OrderItems::LineTotal).big_integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        OwnerId,
        Subtotal,
        PromotionDiscount,
        CouponDiscount,
        DiscountApplied,
        TotalAmount,
        CouponId,
        PromotionId,
        FreeShipping,
        ShippingAddress,
        PaymentMethod,
        PaymentStatus,
        Status,
        Notes,
        OrderDate,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        VariantId,
        Name,
        Quantity,
        UnitPrice,
        LineTotal,
    }
}
